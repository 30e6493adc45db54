pub mod complexity;
pub mod retriever;
pub mod sanitize;

pub use complexity::{classify_query, ComplexitySignals, QueryComplexity, RetrievalParams};
pub use retriever::{
    format_results, AdaptiveRetrieval, LawRetriever, RetrievalInsights, RetrievalRecord,
};
pub use sanitize::clean_query;
