//! Three-layer risk limits.

use crate::error::{RiskError, RiskResult};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Fraction of a limit at which a tripped one-shot flag re-arms.
pub const RECOVERY_FRACTION: f64 = 0.8;

/// Percent-of-balance loss limits plus session boundaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Layer 1: worst allowed realized+unrealized P&L for one setup.
    pub max_loss_per_setup_pct: f64,
    /// Layer 2: worst allowed unrealized P&L across all positions.
    pub max_total_unrealized_loss_pct: f64,
    /// Layer 3: worst allowed daily total P&L; breach engages the lock.
    pub daily_loss_limit_pct: f64,
    pub session_start: NaiveTime,
    pub session_end: NaiveTime,
}

impl RiskConfig {
    pub fn validate(&self) -> RiskResult<()> {
        for (name, pct) in [
            ("max_loss_per_setup_pct", self.max_loss_per_setup_pct),
            (
                "max_total_unrealized_loss_pct",
                self.max_total_unrealized_loss_pct,
            ),
            ("daily_loss_limit_pct", self.daily_loss_limit_pct),
        ] {
            if !(0.0..=100.0).contains(&pct) || pct == 0.0 {
                return Err(RiskError::InvalidConfig(format!(
                    "{name} must be in (0, 100], got {pct}"
                )));
            }
        }
        Ok(())
    }

    /// Dollar limit for one setup at the given balance.
    #[must_use]
    pub fn per_setup_limit(&self, balance: f64) -> f64 {
        balance * self.max_loss_per_setup_pct / 100.0
    }

    /// Dollar limit for total unrealized loss at the given balance.
    #[must_use]
    pub fn total_portfolio_limit(&self, balance: f64) -> f64 {
        balance * self.max_total_unrealized_loss_pct / 100.0
    }

    /// Dollar limit for the daily loss at the session's starting balance.
    #[must_use]
    pub fn daily_loss_limit(&self, starting_balance: f64) -> f64 {
        starting_balance * self.daily_loss_limit_pct / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RiskConfig {
        RiskConfig {
            max_loss_per_setup_pct: 2.0,
            max_total_unrealized_loss_pct: 5.0,
            daily_loss_limit_pct: 10.0,
            session_start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            session_end: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
        }
    }

    #[test]
    fn test_limits_scale_with_balance() {
        let config = config();
        assert!((config.per_setup_limit(10_000.0) - 200.0).abs() < 1e-9);
        assert!((config.total_portfolio_limit(10_000.0) - 500.0).abs() < 1e-9);
        assert!((config.daily_loss_limit(10_000.0) - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let mut bad = config();
        bad.daily_loss_limit_pct = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.max_loss_per_setup_pct = 150.0;
        assert!(bad.validate().is_err());

        assert!(config().validate().is_ok());
    }
}
