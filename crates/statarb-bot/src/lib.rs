//! Pair-trading engine.
//!
//! Wires the domain crates into five cooperating worker loops sharing one
//! trading core behind a coarse async mutex:
//!
//! ```text
//! collector -> snapshot queue -> signal -> action queue -> execution
//!                      risk supervisor / monitor / attribution (periodic)
//! ```
//!
//! Startup order: persistence recovery, lock manager, risk supervisor,
//! collector, signal, execution, monitor, attribution. Shutdown is
//! cooperative via a shared running flag.

pub mod app;
pub mod config;
pub mod error;
pub mod recovery;
pub mod workers;

pub use app::{Engine, TradingCore};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
