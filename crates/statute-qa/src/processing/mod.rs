pub mod corpus;
pub mod segmenter;

pub use corpus::{load_corpus, segment_corpus};
pub use segmenter::StatuteSegmenter;
