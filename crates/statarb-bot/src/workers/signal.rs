//! Signal worker loop.
//!
//! Drains the snapshot queue, classifies each snapshot, and feeds the
//! action queue. Exits preempt everything already queued. Entry/pyramid
//! decisions are delegated to the unified executor via the action; the
//! rebalance check runs here on every snapshot while a position is open.

use super::Shared;
use statarb_core::{Action, AlertSeverity, MarketSnapshot};
use statarb_risk::AlertThrottle;
use statarb_signal::SignalKind;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Z-score jump between consecutive snapshots worth alerting on.
const ZSCORE_JUMP_ALERT: f64 = 0.3;

pub struct SignalWorker {
    shared: Shared,
    snapshot_rx: mpsc::Receiver<MarketSnapshot>,
    last_zscore: Option<f64>,
    throttle: AlertThrottle,
}

impl SignalWorker {
    pub fn new(shared: Shared, snapshot_rx: mpsc::Receiver<MarketSnapshot>) -> Self {
        Self {
            shared,
            snapshot_rx,
            last_zscore: None,
            throttle: AlertThrottle::default_cooldown(),
        }
    }

    pub async fn run(mut self) {
        info!("Signal worker started");

        while self.shared.is_running() {
            let snapshot =
                match tokio::time::timeout(Duration::from_secs(5), self.snapshot_rx.recv()).await
                {
                    Ok(Some(snapshot)) => snapshot,
                    Ok(None) => break, // collector gone
                    Err(_) => continue,
                };
            self.process(snapshot).await;
        }

        info!("Signal worker stopped");
    }

    async fn process(&mut self, snapshot: MarketSnapshot) {
        let (signal, current_side, spread_id) = {
            let core = self.shared.core.lock().await;
            let current_side = core.registry.current_side(&self.shared.primary_spec.symbol);
            let signal = core.signal_generator.classify(&snapshot, current_side);
            (signal, current_side, core.registry.open_spread_id())
        };

        info!(
            zscore = snapshot.zscore,
            primary = snapshot.primary_bid,
            secondary = snapshot.secondary_bid,
            signal = %signal.kind,
            "Market"
        );

        if let Some(last) = self.last_zscore {
            let change = snapshot.zscore - last;
            if change.abs() > ZSCORE_JUMP_ALERT && self.throttle.should_alert("zscore_jump") {
                warn!(change, "Significant z-score change");
                self.shared.alerts.emit(
                    AlertSeverity::Warning,
                    "Z-score jump",
                    format!("z-score moved {change:+.3} in one update"),
                );
            }
        }
        self.last_zscore = Some(snapshot.zscore);

        // Exits preempt everything queued.
        if signal.kind.is_exit() {
            let side = match signal.kind {
                SignalKind::CloseLong => statarb_core::SpreadSide::Long,
                _ => statarb_core::SpreadSide::Short,
            };
            info!(zscore = signal.zscore, %side, "EXIT signal detected");
            self.shared.actions.push_preempting(Action::Exit {
                side,
                zscore: signal.zscore,
            });
            return;
        }

        // Entry or pyramid: let the grid decide.
        if signal.kind.is_entry() || current_side.is_some() {
            let action = Action::EntryOrPyramid {
                snapshot: snapshot.clone(),
                entry_side: signal.kind.entry_side(),
                current_side,
                spread_id: spread_id.clone(),
            };
            if self.shared.actions.push(action).is_err() {
                warn!("Action queue full, dropping entry/pyramid check");
            }
        }

        // Volume rebalance check while a position is open.
        if current_side.is_some()
            && self
                .shared
                .features
                .volume_rebalancing
                .load(Ordering::SeqCst)
        {
            self.check_rebalance(&snapshot).await;
        }
    }

    /// Compare broker-reported leg volumes against the current beta.
    async fn check_rebalance(&mut self, snapshot: &MarketSnapshot) {
        let positions = match self.shared.broker.positions(Some(self.shared.magic)).await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "Failed to get broker volumes for rebalance check");
                return;
            }
        };

        let primary_lots: f64 = positions
            .iter()
            .filter(|p| p.symbol == self.shared.primary_spec.symbol)
            .map(|p| p.volume.to_f64())
            .sum();
        let secondary_lots: f64 = positions
            .iter()
            .filter(|p| p.symbol == self.shared.secondary_spec.symbol)
            .map(|p| p.volume.to_f64())
            .sum();

        let core = self.shared.core.lock().await;
        let Some(spread_id) = core.registry.open_spread_id() else {
            return;
        };
        let Some(side) = core.registry.current_side(&self.shared.primary_spec.symbol) else {
            return;
        };

        let adjustment = core.rebalancer.check_volume_imbalance(
            &spread_id,
            side,
            snapshot.hedge_ratio,
            snapshot.zscore,
            primary_lots,
            secondary_lots,
            &self.shared.primary_spec,
            &self.shared.secondary_spec,
            chrono::Utc::now(),
        );
        drop(core);

        if let Some(adjustment) = adjustment {
            debug!(reason = %adjustment.reason, "Queueing volume rebalance");
            let action = Action::VolumeRebalance {
                adjustment,
                snapshot: snapshot.clone(),
            };
            if self.shared.actions.push(action).is_err() {
                warn!("Action queue full, dropping volume rebalance");
            }
        }
    }
}
