//! Signal classification.
//!
//! Maps each fresh `MarketSnapshot`, together with the current position
//! side, to a trading signal. Pure and synchronous; the signal worker loop
//! owns queueing and priority.

pub mod error;
pub mod generator;
pub mod signal;

pub use error::{SignalError, SignalResult};
pub use generator::{SignalConfig, SignalGenerator};
pub use signal::{Signal, SignalKind};
