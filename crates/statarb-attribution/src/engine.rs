//! Attribution engine.
//!
//! Pure function of (registered entry snapshot, current snapshot,
//! broker-reported total P&L). Directional P&L is defined as the residual
//! after all modelled components, so the components always sum to the
//! broker total exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statarb_core::{SpreadId, SpreadSide};
use std::collections::HashMap;
use tracing::info;

/// State of both legs at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub timestamp: DateTime<Utc>,
    pub primary_bid: f64,
    pub primary_ask: f64,
    pub secondary_bid: f64,
    pub secondary_ask: f64,
    pub spread: f64,
    pub mean: f64,
    pub std: f64,
    pub zscore: f64,
    pub hedge_ratio: f64,
    pub primary_volume: f64,
    pub secondary_volume: f64,
    pub side: SpreadSide,
    pub primary_price: f64,
    pub secondary_price: f64,
    pub primary_contract: f64,
    pub secondary_contract: f64,
}

/// Health classification of a spread's P&L mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    PureStatArb,
    Directional,
    Mixed,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PureStatArb => write!(f, "PURE_STAT_ARB"),
            Self::Directional => write!(f, "DIRECTIONAL"),
            Self::Mixed => write!(f, "MIXED"),
        }
    }
}

/// The seven components plus derived health metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributionComponents {
    pub spread_pnl: f64,
    pub spread_pnl_pct: f64,
    pub mean_drift_pnl: f64,
    pub mean_drift_pnl_pct: f64,
    pub directional_pnl: f64,
    pub directional_pnl_pct: f64,
    pub hedge_imbalance_pnl: f64,
    pub hedge_imbalance_pnl_pct: f64,
    pub transaction_costs: f64,
    pub transaction_costs_pct: f64,
    pub slippage: f64,
    pub slippage_pct: f64,
    pub rebalance_alpha: f64,
    pub rebalance_alpha_pct: f64,
    pub total_pnl: f64,
    /// 1.0 = clean hedge, 0.0 = pure directional bet.
    pub hedge_quality: f64,
    /// Share of P&L explained by spread + mean-drift, in percent.
    pub strategy_purity: f64,
    pub classification: Classification,
}

impl AttributionComponents {
    fn unattributed(total_pnl: f64) -> Self {
        Self {
            spread_pnl: 0.0,
            spread_pnl_pct: 0.0,
            mean_drift_pnl: 0.0,
            mean_drift_pnl_pct: 0.0,
            directional_pnl: 0.0,
            directional_pnl_pct: 0.0,
            hedge_imbalance_pnl: 0.0,
            hedge_imbalance_pnl_pct: 0.0,
            transaction_costs: 0.0,
            transaction_costs_pct: 0.0,
            slippage: 0.0,
            slippage_pct: 0.0,
            rebalance_alpha: 0.0,
            rebalance_alpha_pct: 0.0,
            total_pnl,
            hedge_quality: 0.0,
            strategy_purity: 0.0,
            classification: Classification::Mixed,
        }
    }
}

/// Per-spread attribution state.
pub struct AttributionEngine {
    positions: HashMap<SpreadId, PositionSnapshot>,
    commission_per_lot: f64,
}

impl AttributionEngine {
    #[must_use]
    pub fn new(commission_per_lot: f64) -> Self {
        Self {
            positions: HashMap::new(),
            commission_per_lot,
        }
    }

    pub fn register_position(&mut self, spread_id: SpreadId, entry: PositionSnapshot) {
        info!(spread_id = %spread_id.prefix(), "Attribution position registered");
        self.positions.insert(spread_id, entry);
    }

    pub fn unregister_position(&mut self, spread_id: &SpreadId) {
        self.positions.remove(spread_id);
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    #[must_use]
    pub fn is_registered(&self, spread_id: &SpreadId) -> bool {
        self.positions.contains_key(spread_id)
    }

    #[must_use]
    pub fn entry_snapshot(&self, spread_id: &SpreadId) -> Option<&PositionSnapshot> {
        self.positions.get(spread_id)
    }

    /// Decompose the broker-reported P&L of one spread.
    ///
    /// Unregistered spreads come back with everything in `total_pnl` and
    /// zero components.
    #[must_use]
    pub fn calculate(
        &self,
        spread_id: &SpreadId,
        current: &PositionSnapshot,
        total_pnl: f64,
    ) -> AttributionComponents {
        let Some(entry) = self.positions.get(spread_id) else {
            return AttributionComponents::unattributed(total_pnl);
        };

        let mut c = AttributionComponents::unattributed(total_pnl);
        let entry_notional = entry.primary_volume * entry.primary_contract;

        // Entered short-spread (spread above mean) profits when the spread
        // falls; long-spread is the mirror.
        let entered_above_mean = entry.spread > entry.mean;
        let spread_change = entry.spread - current.spread;
        c.spread_pnl = if entered_above_mean {
            spread_change * entry_notional
        } else {
            -spread_change * entry_notional
        };

        let mean_change = current.mean - entry.mean;
        c.mean_drift_pnl = if entered_above_mean {
            mean_change * entry_notional
        } else {
            -mean_change * entry_notional
        };

        // Hedge imbalance: secondary lots in excess of primary / beta, repriced
        // by the secondary move since entry.
        if entry.hedge_ratio.abs() > 1e-9 {
            let ideal_secondary = current.primary_volume / entry.hedge_ratio;
            let excess_secondary = current.secondary_volume - ideal_secondary;
            let secondary_change = current.secondary_price - entry.secondary_price;
            let exposure = excess_secondary * current.secondary_contract;
            c.hedge_imbalance_pnl = match entry.side {
                // LONG spread holds the secondary short.
                SpreadSide::Long => -secondary_change * exposure,
                SpreadSide::Short => secondary_change * exposure,
            };
        }

        // Costs: bid/ask spread both ways plus commission per lot per side.
        let entry_spread_cost = (entry.primary_ask - entry.primary_bid)
            * entry.primary_volume
            * entry.primary_contract
            + (entry.secondary_ask - entry.secondary_bid)
                * entry.secondary_volume
                * entry.secondary_contract;
        let exit_spread_cost = (current.primary_ask - current.primary_bid)
            * current.primary_volume
            * current.primary_contract
            + (current.secondary_ask - current.secondary_bid)
                * current.secondary_volume
                * current.secondary_contract;
        let commission =
            (entry.primary_volume + entry.secondary_volume) * self.commission_per_lot * 2.0;
        c.transaction_costs = -(entry_spread_cost + exit_spread_cost + commission);

        // Entry-only mode books no slippage; alpha accrues only once
        // rebalance fills are attributed separately.
        c.slippage = 0.0;
        c.rebalance_alpha = 0.0;

        let explained = c.spread_pnl
            + c.mean_drift_pnl
            + c.hedge_imbalance_pnl
            + c.transaction_costs
            + c.slippage
            + c.rebalance_alpha;
        c.directional_pnl = total_pnl - explained;

        if total_pnl.abs() > 0.01 {
            let pct = |x: f64| x / total_pnl * 100.0;
            c.spread_pnl_pct = pct(c.spread_pnl);
            c.mean_drift_pnl_pct = pct(c.mean_drift_pnl);
            c.directional_pnl_pct = pct(c.directional_pnl);
            c.hedge_imbalance_pnl_pct = pct(c.hedge_imbalance_pnl);
            c.transaction_costs_pct = pct(c.transaction_costs);
            c.slippage_pct = pct(c.slippage);
            c.rebalance_alpha_pct = pct(c.rebalance_alpha);
        }

        // Near breakeven the percentage form blows up; judge the hedge by
        // absolute directional dollars instead.
        c.hedge_quality = if total_pnl.abs() > 1.0 {
            (1.0 - (c.directional_pnl / total_pnl).abs()).clamp(0.0, 1.0)
        } else {
            match c.directional_pnl.abs() {
                d if d < 5.0 => 1.0,
                d if d < 20.0 => 0.8,
                d if d < 50.0 => 0.6,
                _ => 0.3,
            }
        };

        let statistical = c.spread_pnl + c.mean_drift_pnl;
        c.strategy_purity = if total_pnl.abs() > 0.01 {
            statistical / total_pnl * 100.0
        } else {
            100.0
        };

        c.classification = if c.spread_pnl_pct.abs() > 70.0 && c.directional_pnl_pct.abs() < 20.0 {
            Classification::PureStatArb
        } else if c.directional_pnl_pct.abs() > 50.0 {
            Classification::Directional
        } else {
            Classification::Mixed
        };

        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(spread: f64, mean: f64, secondary_price: f64) -> PositionSnapshot {
        PositionSnapshot {
            timestamp: Utc::now(),
            primary_bid: 2400.0,
            primary_ask: 2400.0,
            secondary_bid: secondary_price,
            secondary_ask: secondary_price,
            spread,
            mean,
            std: 20.0,
            zscore: (spread - mean) / 20.0,
            hedge_ratio: 2.0,
            primary_volume: 1.0,
            secondary_volume: 0.5,
            side: SpreadSide::Long,
            primary_price: 2400.0,
            secondary_price,
            primary_contract: 100.0,
            secondary_contract: 5000.0,
        }
    }

    fn engine_with(entry: PositionSnapshot) -> (AttributionEngine, SpreadId) {
        let mut engine = AttributionEngine::new(0.0);
        let id = SpreadId(String::from("s1"));
        engine.register_position(id.clone(), entry);
        (engine, id)
    }

    #[test]
    fn test_components_sum_to_total() {
        let (engine, id) = engine_with(snapshot(2260.0, 2300.0, 30.0));
        let current = snapshot(2290.0, 2302.0, 30.4);

        let c = engine.calculate(&id, &current, 250.0);
        let sum = c.spread_pnl
            + c.mean_drift_pnl
            + c.directional_pnl
            + c.hedge_imbalance_pnl
            + c.transaction_costs
            + c.slippage
            + c.rebalance_alpha;
        assert!((sum - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_spread_convergence_is_positive_spread_pnl() {
        // Entered below the mean; spread rising toward it is convergence.
        let (engine, id) = engine_with(snapshot(2260.0, 2300.0, 30.0));
        let current = snapshot(2290.0, 2300.0, 30.0);

        let c = engine.calculate(&id, &current, 3_000.0);
        // -(2260 - 2290) * 1.0 * 100 = +3000.
        assert!((c.spread_pnl - 3_000.0).abs() < 1e-9);
        assert_eq!(c.classification, Classification::PureStatArb);
        assert!(c.hedge_quality > 0.9);
    }

    #[test]
    fn test_perfect_hedge_has_zero_imbalance() {
        let (engine, id) = engine_with(snapshot(2260.0, 2300.0, 30.0));
        // Volumes still satisfy secondary = primary / beta.
        let current = snapshot(2270.0, 2300.0, 31.0);
        let c = engine.calculate(&id, &current, 1_000.0);
        assert!(c.hedge_imbalance_pnl.abs() < 1e-9);
    }

    #[test]
    fn test_excess_secondary_short_loses_when_secondary_rallies() {
        let (engine, id) = engine_with(snapshot(2260.0, 2300.0, 30.0));
        let mut current = snapshot(2260.0, 2300.0, 32.0);
        current.secondary_volume = 0.6; // 0.1 lots beyond the clean hedge

        let c = engine.calculate(&id, &current, 0.0);
        // Short 0.1 excess lots x 5000 x +2.0 move = -1000.
        assert!((c.hedge_imbalance_pnl + 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_directional_classification() {
        let (engine, id) = engine_with(snapshot(2260.0, 2300.0, 30.0));
        // Spread unchanged but P&L large: all residual/directional.
        let current = snapshot(2260.0, 2300.0, 30.0);

        let c = engine.calculate(&id, &current, 2_000.0);
        assert_eq!(c.classification, Classification::Directional);
        assert!(c.directional_pnl_pct > 99.0);
        assert!(c.hedge_quality < 0.1);
    }

    #[test]
    fn test_near_breakeven_uses_absolute_bands() {
        let (engine, id) = engine_with(snapshot(2260.0, 2300.0, 30.0));
        let current = snapshot(2260.0, 2300.0, 30.0);

        // Tiny total, tiny residual: excellent hedge.
        let c = engine.calculate(&id, &current, 0.5);
        assert!((c.hedge_quality - 1.0).abs() < 1e-9);
        assert!((c.strategy_purity - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_unregistered_spread_is_unattributed() {
        let engine = AttributionEngine::new(0.0);
        let c = engine.calculate(
            &SpreadId(String::from("nope")),
            &snapshot(2260.0, 2300.0, 30.0),
            42.0,
        );
        assert_eq!(c.total_pnl, 42.0);
        assert_eq!(c.spread_pnl, 0.0);
    }

    #[test]
    fn test_commission_in_transaction_costs() {
        let mut engine = AttributionEngine::new(7.0);
        let id = SpreadId(String::from("s1"));
        engine.register_position(id.clone(), snapshot(2260.0, 2300.0, 30.0));

        let c = engine.calculate(&id, &snapshot(2260.0, 2300.0, 30.0), 0.0);
        // (1.0 + 0.5) lots x 7 per lot x 2 sides = 21, negated.
        assert!((c.transaction_costs + 21.0).abs() < 1e-9);
    }
}
