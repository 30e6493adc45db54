use thiserror::Error;

/// Errors raised inside the retrieval, memory and agent layers.
///
/// Nothing of this type escapes the stage coordinator: it is folded into
/// the `success` / `error` / `details` fields of the result records.
#[derive(Error, Debug)]
pub enum QaError {
    /// Index or metadata files missing, unreadable, or inconsistent with a query vector.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    /// Agent output that neither validates nor can be repaired.
    #[error("Malformed agent output: {0}")]
    MalformedAgentOutput(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Language model error: {0}")]
    LanguageModel(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl QaError {
    /// Whether the coordinator may recover by re-invoking the agent.
    pub fn is_format_error(&self) -> bool {
        matches!(self, QaError::MalformedAgentOutput(_))
    }

    /// Short machine-readable tag used in result records and statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            QaError::IndexUnavailable(_) => "index_unavailable",
            QaError::EmbeddingService(_) => "embedding_service_error",
            QaError::MalformedAgentOutput(_) => "malformed_agent_output",
            QaError::SessionNotFound(_) => "session_not_found",
            QaError::LanguageModel(_) => "language_model_error",
            QaError::InvalidRequest(_) => "invalid_request",
            QaError::Io(_) => "io_error",
            QaError::Serialization(_) => "serialization_error",
        }
    }
}

impl From<rmp_serde::encode::Error> for QaError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        QaError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for QaError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        QaError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for QaError {
    fn from(e: serde_json::Error) -> Self {
        QaError::Serialization(e.to_string())
    }
}

pub type QaResult<T> = std::result::Result<T, QaError>;
