//! Attribution worker loop.
//!
//! Every cycle, decomposes each open spread's broker-reported P&L into its
//! seven components and logs the health picture. When the kill-switch is
//! enabled and a spread has gone predominantly directional while the
//! z-score diverges, it forces an exit.

use super::Shared;
use statarb_attribution::PositionSnapshot;
use statarb_core::{Action, SpreadId};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{info, warn};

/// Directional share (percent of total P&L) that trips the kill-switch.
const KILL_SWITCH_DIRECTIONAL_PCT: f64 = 80.0;

pub struct AttributionWorker {
    shared: Shared,
    interval: Duration,
}

impl AttributionWorker {
    pub fn new(shared: Shared, interval_secs: f64) -> Self {
        Self {
            shared,
            interval: Duration::from_secs_f64(interval_secs),
        }
    }

    pub async fn run(self) {
        info!("Attribution worker started");

        // Short first delay so the collector has produced a snapshot.
        tokio::time::sleep(Duration::from_secs(5).min(self.interval)).await;

        while self.shared.is_running() {
            self.cycle().await;
            tokio::time::sleep(self.interval).await;
        }

        info!("Attribution worker stopped");
    }

    async fn cycle(&self) {
        let positions = match self.shared.broker.positions(Some(self.shared.magic)).await {
            Ok(positions) if !positions.is_empty() => positions,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "Attribution failed to list positions");
                return;
            }
        };
        let profit_by_ticket: HashMap<u64, f64> =
            positions.iter().map(|p| (p.ticket, p.profit)).collect();

        let core = self.shared.core.lock().await;
        let Some(snapshot) = core.current_snapshot.clone() else {
            return;
        };

        // Group tracked legs per spread; attribution needs both legs.
        let mut spreads: HashMap<SpreadId, (Option<f64>, Option<f64>, f64)> = HashMap::new();
        for leg in core.registry.legs() {
            let Some(profit) = profit_by_ticket.get(&leg.ticket) else {
                continue;
            };
            let entry = spreads.entry(leg.spread_id.clone()).or_insert((None, None, 0.0));
            if leg.is_primary {
                entry.0 = Some(entry.0.unwrap_or(0.0) + leg.volume.to_f64());
            } else {
                entry.1 = Some(entry.1.unwrap_or(0.0) + leg.volume.to_f64());
            }
            entry.2 += profit;
        }

        for (spread_id, (primary_volume, secondary_volume, total_pnl)) in spreads {
            let (Some(primary_volume), Some(secondary_volume)) =
                (primary_volume, secondary_volume)
            else {
                // One-legged spread (mid-rebalance or unhedged incident).
                continue;
            };
            let Some(entry) = core.attribution.entry_snapshot(&spread_id) else {
                continue;
            };

            let current = PositionSnapshot {
                timestamp: snapshot.timestamp,
                primary_bid: snapshot.primary_bid,
                primary_ask: snapshot.primary_ask,
                secondary_bid: snapshot.secondary_bid,
                secondary_ask: snapshot.secondary_ask,
                spread: snapshot.spread,
                mean: snapshot.spread_mean,
                std: snapshot.spread_std,
                zscore: snapshot.zscore,
                hedge_ratio: snapshot.hedge_ratio,
                primary_volume,
                secondary_volume,
                side: entry.side,
                primary_price: snapshot.primary_bid,
                secondary_price: snapshot.secondary_bid,
                primary_contract: self.shared.primary_spec.contract_size,
                secondary_contract: self.shared.secondary_spec.contract_size,
            };
            let entry_zscore = entry.zscore;
            let components = core.attribution.calculate(&spread_id, &current, total_pnl);

            info!(
                spread_id = %spread_id.prefix(),
                total = components.total_pnl,
                spread = components.spread_pnl,
                mean_drift = components.mean_drift_pnl,
                directional = components.directional_pnl,
                hedge_imbalance = components.hedge_imbalance_pnl,
                costs = components.transaction_costs,
                hedge_quality = components.hedge_quality,
                purity = components.strategy_purity,
                classification = %components.classification,
                "P&L attribution"
            );

            let kill_switch = self
                .shared
                .features
                .attribution_kill_switch
                .load(Ordering::SeqCst);
            let diverging = snapshot.zscore.abs() > entry_zscore.abs();
            if kill_switch
                && components.directional_pnl_pct.abs() > KILL_SWITCH_DIRECTIONAL_PCT
                && diverging
            {
                warn!(
                    spread_id = %spread_id.prefix(),
                    directional_pct = components.directional_pnl_pct,
                    "Kill-switch: spread has gone directional while diverging, forcing exit"
                );
                self.shared.actions.push_preempting(Action::Exit {
                    side: entry.side,
                    zscore: snapshot.zscore,
                });
            }
        }
    }
}
