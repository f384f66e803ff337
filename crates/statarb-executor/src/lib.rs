//! Order execution.
//!
//! `TradeExecutor` talks to the broker (paired spread orders, single-leg
//! orders); `CloseManager` fans out close-all requests; `UnifiedExecutor`
//! is the 2-variable grid state machine deciding initial entries and
//! pyramids; `VolumeRebalancer` issues single-leg hedge corrections.

pub mod close_all;
pub mod error;
pub mod rebalance;
pub mod trade;
pub mod unified;

pub use close_all::{CloseManager, CloseReport};
pub use error::{ExecutorError, ExecutorResult};
pub use rebalance::{RebalancerConfig, VolumeRebalancer};
pub use trade::{SpreadOrderOutcome, TradeExecutor};
pub use unified::{ExecutionContext, UnifiedConfig, UnifiedExecutor};
