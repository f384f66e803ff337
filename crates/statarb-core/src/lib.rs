//! Core domain types for the pair-trading engine.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Price`, `Lots`: precision-safe numeric types for orders and fills
//! - `MarketSnapshot`: one tick of the rolling spread statistics
//! - `Action`: the typed unit of work flowing from signal to execution
//! - `ActionQueue`: bounded FIFO with exit preemption
//! - `AlertBus`: broadcast stream of operator-facing alerts

pub mod action;
pub mod alert;
pub mod decimal;
pub mod error;
pub mod queue;
pub mod session;
pub mod state;
pub mod types;

pub use action::{Action, VolumeAdjustment};
pub use alert::{Alert, AlertBus, AlertSeverity};
pub use decimal::{Lots, Price};
pub use error::{CoreError, Result};
pub use queue::ActionQueue;
pub use session::{next_session_start, parse_session_time, session_start_at};
pub use state::SpreadEntryState;
pub use types::{
    MarketSnapshot, OrderAction, PositionId, SpreadId, SpreadSide, SymbolSpec, ZSCORE_STD_EPSILON,
};
