//! Error types for statarb-broker.

use thiserror::Error;

/// Broker adapter errors.
///
/// `Transient` failures are retryable (tick fetch hiccup, momentary send
/// failure); `Disconnected` is the hard state the risk supervisor watches
/// for across cycles.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker not connected")]
    Disconnected,

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("No tick data for {0}")]
    NoTick(String),

    #[error("Insufficient history for {symbol}: {available} bars available, {required} required")]
    InsufficientHistory {
        symbol: String,
        available: usize,
        required: usize,
    },

    #[error("Transient broker failure: {0}")]
    Transient(String),
}

/// Result type alias for broker operations.
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
