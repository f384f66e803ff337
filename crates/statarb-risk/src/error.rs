//! Error types for statarb-risk.

use thiserror::Error;

/// Risk subsystem errors.
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] statarb_persistence::PersistenceError),

    #[error("Invalid risk configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for risk operations.
pub type RiskResult<T> = std::result::Result<T, RiskError>;
