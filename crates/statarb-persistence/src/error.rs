//! Error types for statarb-persistence.

use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for persistence operations.
pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;
