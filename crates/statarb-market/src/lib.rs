//! Rolling market statistics for the pair.
//!
//! Maintains a true rolling window over primary and secondary closes,
//! re-estimates the hedge ratio every bar, and produces `MarketSnapshot`
//! ticks for the signal pipeline.

pub mod collector;
pub mod error;
pub mod window;

pub use collector::{hedge_quantities, MarketData};
pub use error::{MarketError, MarketResult};
pub use window::{RollingWindow, SpreadStats};
