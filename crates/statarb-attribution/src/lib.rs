//! Real-time P&L attribution.
//!
//! Decomposes a spread's broker-reported P&L into seven components:
//! spread convergence, mean drift, directional residual, hedge imbalance,
//! transaction costs, slippage, and rebalance alpha. The directional share
//! and the derived hedge-quality score feed health logging and the
//! (disabled-by-default) kill-switch.

pub mod engine;

pub use engine::{AttributionComponents, AttributionEngine, Classification, PositionSnapshot};
