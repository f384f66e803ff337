//! Monitor worker loop.
//!
//! Purely passive: every cycle it overwrites the registry's per-leg P&L
//! with the broker's authoritative values, checks the lock for session
//! auto-unlock, and logs the aggregate status. It never decides to trade.

use super::Shared;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct MonitorWorker {
    shared: Shared,
    interval: Duration,
}

impl MonitorWorker {
    pub fn new(shared: Shared, interval_secs: f64) -> Self {
        Self {
            shared,
            interval: Duration::from_secs_f64(interval_secs),
        }
    }

    pub async fn run(self) {
        info!("Monitor started");

        while self.shared.is_running() {
            tokio::time::sleep(self.interval).await;
            if !self.shared.is_running() {
                break;
            }

            {
                let mut core = self.shared.core.lock().await;
                if let Err(e) = core.lock.check_auto_unlock() {
                    error!(error = %e, "Auto-unlock check failed");
                }
            }

            let positions = match self.shared.broker.positions(Some(self.shared.magic)).await {
                Ok(positions) => positions,
                Err(e) => {
                    warn!(error = %e, "Monitor failed to list positions");
                    continue;
                }
            };

            let mut core = self.shared.core.lock().await;
            for pos in &positions {
                // Broker P&L includes spread, commission and swap; it wins
                // over any internal estimate.
                core.registry
                    .sync_broker_pnl(pos.ticket, pos.profit, pos.price_current);
            }

            let total_pnl: f64 = positions.iter().map(|p| p.profit).sum();
            info!(
                balance = core.account_balance,
                positions = positions.len(),
                unrealized = total_pnl,
                drawdown = core.drawdown.metrics().current_drawdown_pct,
                "Status"
            );
        }

        info!("Monitor stopped");
    }
}
