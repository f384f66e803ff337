//! Error types for statarb-telemetry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Logging init error: {0}")]
    Init(String),
}

pub type TelemetryResult<T> = std::result::Result<T, TelemetryError>;
