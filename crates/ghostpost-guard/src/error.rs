//! Error types for the safety pipeline

use thiserror::Error;

/// Guard pipeline error types
#[derive(Error, Debug)]
pub enum GuardError {
    /// Database failure while loading or recording state
    #[error("Database error: {0}")]
    Db(#[from] ghostpost_db::DbError),

    /// Counter store unreachable or inconsistent
    #[error("Counter store error: {0}")]
    CounterStore(String),

    /// Serialization error while building a details blob
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for guard operations
pub type GuardResult<T> = std::result::Result<T, GuardError>;

impl From<serde_json::Error> for GuardError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
