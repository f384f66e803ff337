//! Risk management.
//!
//! Three orthogonal loss limits (per-setup, portfolio, daily), the
//! persistent trading lock that outlives the process, drawdown tracking,
//! and alert throttling. The risk supervisor loop itself lives in the bot
//! crate; everything here is broker-independent and synchronous so it can
//! be exercised directly in tests.

pub mod config;
pub mod daily;
pub mod drawdown;
pub mod error;
pub mod lock;
pub mod throttle;

pub use config::RiskConfig;
pub use daily::{DailyHistorySummary, DailyRiskManager, DailyRiskStatus};
pub use drawdown::{DrawdownMetrics, DrawdownMonitor};
pub use error::{RiskError, RiskResult};
pub use lock::{LockState, TradingLockManager};
pub use throttle::AlertThrottle;
