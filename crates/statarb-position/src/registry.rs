//! Open-leg registry and per-spread P&L aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statarb_core::{Lots, OrderAction, PositionId, Price, SpreadId, SpreadSide};
use std::collections::HashMap;
use tracing::warn;

/// One tracked leg of a spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedLeg {
    pub position_id: PositionId,
    pub spread_id: SpreadId,
    pub ticket: u64,
    pub symbol: String,
    pub action: OrderAction,
    pub volume: Lots,
    pub entry_price: Price,
    pub entry_time: DateTime<Utc>,
    pub entry_zscore: f64,
    pub hedge_ratio: f64,
    pub is_primary: bool,
    /// Broker-authoritative unrealized P&L, refreshed by the monitor.
    pub unrealized_pnl: f64,
    pub current_price: Price,
}

/// Cache of open legs keyed by broker ticket.
#[derive(Debug, Default)]
pub struct PositionRegistry {
    legs: HashMap<u64, TrackedLeg>,
    /// Realized P&L per spread this run (partial closes, rebalance legs).
    realized: HashMap<SpreadId, f64>,
}

impl PositionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, leg: TrackedLeg) {
        self.legs.insert(leg.ticket, leg);
    }

    pub fn remove_by_ticket(&mut self, ticket: u64) -> Option<TrackedLeg> {
        self.legs.remove(&ticket)
    }

    pub fn remove_spread(&mut self, spread_id: &SpreadId) -> Vec<TrackedLeg> {
        let tickets: Vec<u64> = self
            .legs
            .values()
            .filter(|l| &l.spread_id == spread_id)
            .map(|l| l.ticket)
            .collect();
        tickets
            .into_iter()
            .filter_map(|t| self.legs.remove(&t))
            .collect()
    }

    pub fn clear(&mut self) {
        self.legs.clear();
        self.realized.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.legs.len()
    }

    #[must_use]
    pub fn legs(&self) -> impl Iterator<Item = &TrackedLeg> {
        self.legs.values()
    }

    #[must_use]
    pub fn get(&self, ticket: u64) -> Option<&TrackedLeg> {
        self.legs.get(&ticket)
    }

    #[must_use]
    pub fn tickets(&self) -> Vec<u64> {
        self.legs.keys().copied().collect()
    }

    /// Spread id of the open setup, if any.
    #[must_use]
    pub fn open_spread_id(&self) -> Option<SpreadId> {
        self.legs.values().next().map(|l| l.spread_id.clone())
    }

    /// Current position side, judged from the primary legs.
    ///
    /// Mixed long/short primaries should not happen; the dominant count
    /// wins and the anomaly is logged.
    #[must_use]
    pub fn current_side(&self, primary_symbol: &str) -> Option<SpreadSide> {
        let mut longs = 0usize;
        let mut shorts = 0usize;
        for leg in self.legs.values().filter(|l| l.symbol == primary_symbol) {
            match leg.action {
                OrderAction::Buy => longs += 1,
                OrderAction::Sell => shorts += 1,
            }
        }
        match (longs, shorts) {
            (0, 0) => None,
            (_, 0) => Some(SpreadSide::Long),
            (0, _) => Some(SpreadSide::Short),
            (l, s) => {
                warn!(longs = l, shorts = s, "Mixed primary positions, using dominant side");
                Some(if l >= s { SpreadSide::Long } else { SpreadSide::Short })
            }
        }
    }

    /// Overwrite a leg's P&L with the broker's authoritative value.
    pub fn sync_broker_pnl(&mut self, ticket: u64, profit: f64, price_current: Price) {
        if let Some(leg) = self.legs.get_mut(&ticket) {
            leg.unrealized_pnl = profit;
            leg.current_price = price_current;
        }
    }

    pub fn add_realized(&mut self, spread_id: &SpreadId, profit: f64) {
        *self.realized.entry(spread_id.clone()).or_insert(0.0) += profit;
    }

    #[must_use]
    pub fn total_unrealized(&self) -> f64 {
        self.legs.values().map(|l| l.unrealized_pnl).sum()
    }

    /// Realized + unrealized P&L per open spread.
    #[must_use]
    pub fn spread_pnls(&self) -> HashMap<SpreadId, f64> {
        let mut pnls: HashMap<SpreadId, f64> = HashMap::new();
        for leg in self.legs.values() {
            *pnls.entry(leg.spread_id.clone()).or_insert(0.0) += leg.unrealized_pnl;
        }
        for (spread_id, realized) in &self.realized {
            if let Some(total) = pnls.get_mut(spread_id) {
                *total += realized;
            }
        }
        pnls
    }

    /// Signed net lots for a symbol (long positive, short negative).
    #[must_use]
    pub fn net_lots(&self, symbol: &str) -> f64 {
        self.legs
            .values()
            .filter(|l| l.symbol == symbol)
            .map(|l| match l.action {
                OrderAction::Buy => l.volume.to_f64(),
                OrderAction::Sell => -l.volume.to_f64(),
            })
            .sum()
    }
}
