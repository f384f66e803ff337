//! Market-data collector loop.
//!
//! Bootstraps the rolling window once, then produces a snapshot every
//! update interval, pushes it onto the snapshot queue, and syncs the
//! internal balance with the broker's real account figures.

use super::Shared;
use statarb_core::MarketSnapshot;
use statarb_market::MarketData;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Internal vs broker balance divergence worth flagging.
const BALANCE_DRIFT_WARN: f64 = 100.0;

pub struct CollectorWorker {
    shared: Shared,
    market: MarketData,
    snapshot_tx: mpsc::Sender<MarketSnapshot>,
    update_interval: Duration,
    window_days: u32,
}

impl CollectorWorker {
    pub fn new(
        shared: Shared,
        market: MarketData,
        snapshot_tx: mpsc::Sender<MarketSnapshot>,
        update_interval_secs: f64,
        window_days: u32,
    ) -> Self {
        Self {
            shared,
            market,
            snapshot_tx,
            update_interval: Duration::from_secs_f64(update_interval_secs),
            window_days,
        }
    }

    pub async fn run(mut self) {
        info!("Collector started");

        // Bootstrap once; keep retrying while the broker warms up.
        while self.shared.is_running() {
            match self.market.bootstrap(self.window_days).await {
                Ok(()) => {
                    info!("Rolling window ready, starting real-time updates");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Bootstrap failed, retrying");
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
            }
        }

        while self.shared.is_running() {
            match self.market.snapshot().await {
                Ok(snapshot) => {
                    debug!(zscore = snapshot.zscore, "Snapshot produced");
                    if let Err(e) = self.snapshot_tx.try_send(snapshot.clone()) {
                        warn!(error = %e, "Snapshot queue full, dropping tick");
                    }
                    self.sync_account(snapshot).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to get market snapshot");
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    continue;
                }
            }
            tokio::time::sleep(self.update_interval).await;
        }

        info!("Collector stopped");
    }

    /// Pull real balance/equity and refresh everything sized off them.
    async fn sync_account(&self, snapshot: MarketSnapshot) {
        let account = match self.shared.broker.account_info().await {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "Failed to get account info");
                let mut core = self.shared.core.lock().await;
                core.current_snapshot = Some(snapshot);
                return;
            }
        };

        let mut core = self.shared.core.lock().await;
        let drift = (core.account_balance - account.balance).abs();
        if drift > BALANCE_DRIFT_WARN {
            warn!(
                internal = core.account_balance,
                broker = account.balance,
                drift,
                "Balance drift detected"
            );
        }
        core.account_balance = account.balance;
        core.unified.update_balance(account.balance);
        core.drawdown.update(account.equity);
        core.current_snapshot = Some(snapshot);

        let status = core.daily.check_risk(account.profit);
        info!(
            balance = account.balance,
            equity = account.equity,
            unrealized = account.profit,
            daily_total = status.daily_total_pnl,
            daily_limit = status.daily_loss_limit,
            remaining = status.remaining_until_daily_limit,
            "Account sync"
        );
    }
}
