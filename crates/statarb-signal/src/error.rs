//! Error types for statarb-signal.

use thiserror::Error;

/// Signal configuration errors.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Invalid threshold configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for signal operations.
pub type SignalResult<T> = std::result::Result<T, SignalError>;
