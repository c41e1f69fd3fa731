//! Error types for the decision engine

use thiserror::Error;

/// Engine error types
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Db(#[from] ghostpost_db::DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] ghostpost_storage::StorageError),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("LLM not available")]
    LlmNotAvailable,

    #[error("Thread not found")]
    ThreadNotFound,

    #[error("No emails in thread")]
    NoEmailsInThread,

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Notification bus error: {0}")]
    Bus(String),
}

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// The user-visible error string for reply generation failures.
    #[must_use]
    pub fn reply_error_message(&self) -> String {
        match self {
            Self::LlmNotAvailable => "LLM not available".to_string(),
            Self::ThreadNotFound => "Thread not found".to_string(),
            Self::NoEmailsInThread => "No emails in thread".to_string(),
            other => other.to_string(),
        }
    }
}
