//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Broker error: {0}")]
    Broker(#[from] statarb_broker::BrokerError),

    #[error("Market error: {0}")]
    Market(#[from] statarb_market::MarketError),

    #[error("Signal error: {0}")]
    Signal(#[from] statarb_signal::SignalError),

    #[error("Risk error: {0}")]
    Risk(#[from] statarb_risk::RiskError),

    #[error("Executor error: {0}")]
    Executor(#[from] statarb_executor::ExecutorError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] statarb_persistence::PersistenceError),

    #[error("Core error: {0}")]
    Core(#[from] statarb_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] statarb_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
