//! Error types for statarb-executor.

use statarb_broker::OrderResult;
use thiserror::Error;

/// Execution errors.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Broker error: {0}")]
    Broker(#[from] statarb_broker::BrokerError),

    #[error("Market error: {0}")]
    Market(#[from] statarb_market::MarketError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] statarb_persistence::PersistenceError),

    #[error("Order rejected on {symbol}: {reason}")]
    OrderRejected { symbol: String, reason: String },

    /// One leg filled, the other failed. The filled leg has been recorded;
    /// recovery resolves the rest.
    #[error("Unhedged incident: {filled_symbol} filled (ticket {filled_ticket}) but {failed_symbol} failed: {reason}")]
    HedgeViolation {
        filled_symbol: String,
        filled_ticket: u64,
        filled: Box<OrderResult>,
        failed_symbol: String,
        reason: String,
    },

    #[error("Computed volume below the minimum lot for {0}")]
    VolumeTooSmall(String),
}

/// Result type alias for execution operations.
pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;
