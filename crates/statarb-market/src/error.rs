//! Error types for statarb-market.

use statarb_broker::BrokerError;
use thiserror::Error;

/// Market data errors.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Insufficient history for {symbol}: {available} bars, need {required}")]
    InsufficientHistory {
        symbol: String,
        available: usize,
        required: usize,
    },

    #[error("Window not bootstrapped")]
    NotBootstrapped,

    #[error("Hedge ratio {0} too close to zero for volume hedging")]
    DegenerateHedgeRatio(f64),
}

/// Result type alias for market data operations.
pub type MarketResult<T> = std::result::Result<T, MarketError>;
