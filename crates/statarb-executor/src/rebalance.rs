//! Single-leg volume rebalancing.
//!
//! When the rolling hedge ratio drifts, the realised two-leg volumes no
//! longer form a clean hedge. The rebalancer computes
//! `imbalance = primary_lots − β × secondary_lots` (the same sign
//! convention as the spread itself) and, when it exceeds the threshold,
//! emits exactly one single-leg correction. The resulting odd broker
//! position count is expected.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use statarb_core::{SpreadId, SpreadSide, SymbolSpec, VolumeAdjustment};
use std::collections::HashMap;
use tracing::{debug, info};

/// Rebalancer tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RebalancerConfig {
    /// Minimum |imbalance| (in primary-lot units) that triggers a correction.
    pub volume_imbalance_threshold: f64,
    /// Minimum seconds between corrections on the same spread.
    pub min_adjustment_interval_secs: i64,
}

/// Volume-drift corrector.
pub struct VolumeRebalancer {
    config: RebalancerConfig,
    last_adjustment: HashMap<SpreadId, DateTime<Utc>>,
}

impl VolumeRebalancer {
    #[must_use]
    pub fn new(config: RebalancerConfig) -> Self {
        Self {
            config,
            last_adjustment: HashMap::new(),
        }
    }

    /// Check whether the current volumes need a single-leg correction.
    ///
    /// `primary_lots` and `secondary_lots` are broker-reported magnitudes.
    /// Returns the adjustment that zeroes the imbalance with the smaller
    /// order, or `None` when within threshold or inside the cooldown.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn check_volume_imbalance(
        &self,
        spread_id: &SpreadId,
        side: SpreadSide,
        hedge_ratio: f64,
        zscore: f64,
        primary_lots: f64,
        secondary_lots: f64,
        primary_spec: &SymbolSpec,
        secondary_spec: &SymbolSpec,
        now: DateTime<Utc>,
    ) -> Option<VolumeAdjustment> {
        if hedge_ratio.abs() < 1e-9 {
            return None;
        }

        let imbalance = primary_lots - hedge_ratio * secondary_lots;
        if imbalance.abs() < self.config.volume_imbalance_threshold {
            return None;
        }

        if let Some(last) = self.last_adjustment.get(spread_id) {
            let elapsed = now - *last;
            if elapsed < Duration::seconds(self.config.min_adjustment_interval_secs) {
                debug!(
                    spread_id = %spread_id.prefix(),
                    elapsed_secs = elapsed.num_seconds(),
                    "Imbalance present but inside adjustment cooldown"
                );
                return None;
            }
        }

        let old_hedge = if secondary_lots.abs() > 1e-9 {
            primary_lots / secondary_lots
        } else {
            0.0
        };

        // Either leg can zero the imbalance exactly; pick the smaller order.
        let secondary_delta = imbalance / hedge_ratio;
        let primary_delta = -imbalance;

        let (symbol, spec, delta, grows) = if secondary_delta.abs() <= primary_delta.abs() {
            (
                secondary_spec.symbol.clone(),
                secondary_spec,
                secondary_delta,
                secondary_delta > 0.0,
            )
        } else {
            (
                primary_spec.symbol.clone(),
                primary_spec,
                primary_delta,
                primary_delta > 0.0,
            )
        };

        let quantity = spec.normalize_lots(statarb_core::Lots::from_f64(delta.abs()));
        if !quantity.is_positive() {
            return None;
        }

        // Growing a leg trades in that leg's original direction; shrinking
        // trades against it.
        let leg_action = if symbol == secondary_spec.symbol {
            side.secondary_action()
        } else {
            side.primary_action()
        };
        let action = if grows { leg_action } else { leg_action.opposite() };

        let adjustment = VolumeAdjustment {
            spread_id: spread_id.clone(),
            symbol,
            action,
            quantity,
            reason: format!(
                "Volume imbalance {imbalance:+.4} exceeds {:.4} at z={zscore:.2}",
                self.config.volume_imbalance_threshold
            ),
            old_hedge,
            new_hedge: hedge_ratio,
        };
        info!(
            spread_id = %spread_id.prefix(),
            symbol = %adjustment.symbol,
            action = %adjustment.action,
            quantity = %adjustment.quantity,
            "Volume correction proposed"
        );
        Some(adjustment)
    }

    /// Record a completed correction (starts the per-spread cooldown).
    pub fn mark_adjusted(&mut self, spread_id: &SpreadId, now: DateTime<Utc>) {
        self.last_adjustment.insert(spread_id.clone(), now);
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.config.volume_imbalance_threshold = threshold;
    }

    pub fn clear(&mut self) {
        self.last_adjustment.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use statarb_core::{Lots, OrderAction, Price};

    fn spec(symbol: &str) -> SymbolSpec {
        SymbolSpec {
            symbol: symbol.to_string(),
            contract_size: 100.0,
            lot_step: Lots::new(dec!(0.01)),
            min_lot: Lots::new(dec!(0.01)),
            max_lot: Lots::new(dec!(100)),
            tick_size: Price::new(dec!(0.01)),
        }
    }

    fn rebalancer() -> VolumeRebalancer {
        VolumeRebalancer::new(RebalancerConfig {
            volume_imbalance_threshold: 0.10,
            min_adjustment_interval_secs: 3600,
        })
    }

    fn sid() -> SpreadId {
        SpreadId(String::from("s1"))
    }

    #[test]
    fn test_perfect_hedge_no_adjustment() {
        // beta = 2, primary = 1, secondary = 0.5: imbalance = 0.
        let adj = rebalancer().check_volume_imbalance(
            &sid(),
            SpreadSide::Short,
            2.0,
            2.2,
            1.0,
            0.5,
            &spec("XAUUSD"),
            &spec("XAGUSD"),
            Utc::now(),
        );
        assert!(adj.is_none());
    }

    #[test]
    fn test_imbalance_buys_secondary_toward_hedge() {
        // beta = 2, primary = 1.00, secondary = 0.30:
        // imbalance = 1 − 0.6 = 0.40 > 0.10.
        let adj = rebalancer()
            .check_volume_imbalance(
                &sid(),
                SpreadSide::Short,
                2.0,
                2.2,
                1.0,
                0.30,
                &spec("XAUUSD"),
                &spec("XAGUSD"),
                Utc::now(),
            )
            .unwrap();

        // Secondary correction is 0.40 / 2 = 0.20 lots, smaller than the
        // 0.40-lot primary alternative. SHORT spread holds the secondary
        // long, so growing it is a BUY.
        assert_eq!(adj.symbol, "XAGUSD");
        assert_eq!(adj.action, OrderAction::Buy);
        assert_eq!(adj.quantity, Lots::new(dec!(0.2)));
        assert!((adj.new_hedge - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_long_spread_grows_secondary_with_sell() {
        // LONG spread holds the secondary short; growing it is a SELL.
        let adj = rebalancer()
            .check_volume_imbalance(
                &sid(),
                SpreadSide::Long,
                2.0,
                -2.2,
                1.0,
                0.30,
                &spec("XAUUSD"),
                &spec("XAGUSD"),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(adj.action, OrderAction::Sell);
    }

    #[test]
    fn test_below_threshold_ignored() {
        // imbalance = 1 − 2 × 0.48 = 0.04 < 0.10.
        let adj = rebalancer().check_volume_imbalance(
            &sid(),
            SpreadSide::Short,
            2.0,
            2.2,
            1.0,
            0.48,
            &spec("XAUUSD"),
            &spec("XAGUSD"),
            Utc::now(),
        );
        assert!(adj.is_none());
    }

    #[test]
    fn test_cooldown_blocks_repeat_adjustment() {
        let mut rebalancer = rebalancer();
        let now = Utc::now();
        rebalancer.mark_adjusted(&sid(), now);

        let blocked = rebalancer.check_volume_imbalance(
            &sid(),
            SpreadSide::Short,
            2.0,
            2.2,
            1.0,
            0.30,
            &spec("XAUUSD"),
            &spec("XAGUSD"),
            now + Duration::seconds(600),
        );
        assert!(blocked.is_none());

        let allowed = rebalancer.check_volume_imbalance(
            &sid(),
            SpreadSide::Short,
            2.0,
            2.2,
            1.0,
            0.30,
            &spec("XAUUSD"),
            &spec("XAGUSD"),
            now + Duration::seconds(3601),
        );
        assert!(allowed.is_some());
    }

    #[test]
    fn test_excess_secondary_shrinks_with_opposite_action() {
        // beta = 2, primary = 1.00, secondary = 0.80:
        // imbalance = 1 − 1.6 = −0.60; secondary correction −0.30.
        let adj = rebalancer()
            .check_volume_imbalance(
                &sid(),
                SpreadSide::Short,
                2.0,
                2.2,
                1.0,
                0.80,
                &spec("XAUUSD"),
                &spec("XAGUSD"),
                Utc::now(),
            )
            .unwrap();
        // Shrinking a long secondary leg is a SELL.
        assert_eq!(adj.symbol, "XAGUSD");
        assert_eq!(adj.action, OrderAction::Sell);
        assert_eq!(adj.quantity, Lots::new(dec!(0.3)));
    }
}
