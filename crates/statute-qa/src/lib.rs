pub mod agent;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod indexing;
pub mod llm;
pub mod memory;
pub mod processing;
pub mod search;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export primary types for convenience
pub use agent::{AnswerStyle, QaRequest, QaResponse, StageCoordinator};
pub use config::QaConfig;
pub use error::{QaError, QaResult};
pub use search::LawRetriever;
pub use types::{AgentResult, AgentTask, LegalSegment, TaskType};
