//! Execution worker loop.
//!
//! Applies actions from the queue against the broker and updates every
//! registry from the system's point of view atomically (under the core
//! mutex). Exits close everything under the strategy tag, book the realized
//! P&L into the daily counters, and archive the spread.

use super::{full_internal_cleanup, Shared};
use chrono::{DateTime, Utc};
use statarb_core::{
    Action, AlertSeverity, MarketSnapshot, PositionId, SpreadId, SpreadSide, VolumeAdjustment,
};
use statarb_executor::{CloseManager, ExecutionContext, ExecutorError};
use statarb_persistence::PersistedPosition;
use statarb_position::TrackedLeg;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct ExecutionWorker {
    shared: Shared,
    closer: CloseManager,
}

impl ExecutionWorker {
    pub fn new(shared: Shared) -> Self {
        let closer = CloseManager::new(shared.broker.clone(), shared.magic);
        Self { shared, closer }
    }

    pub async fn run(mut self) {
        info!("Execution worker started");

        while self.shared.is_running() {
            let Some(action) = self.shared.actions.pop_timeout(Duration::from_secs(5)).await
            else {
                continue;
            };
            info!(kind = action.kind(), "Applying action");

            match action {
                Action::Exit { side, zscore } => self.handle_exit(side, zscore).await,
                Action::EntryOrPyramid {
                    snapshot,
                    entry_side,
                    current_side,
                    spread_id,
                } => {
                    self.handle_entry_or_pyramid(snapshot, entry_side, current_side, spread_id)
                        .await
                }
                Action::VolumeRebalance {
                    adjustment,
                    snapshot,
                } => self.handle_rebalance(adjustment, snapshot).await,
            }
        }

        info!("Execution worker stopped");
    }

    async fn handle_exit(&mut self, side: SpreadSide, zscore: f64) {
        info!(%side, zscore, "Exit: closing all positions under the strategy tag");
        let close_started = Utc::now();

        let report = match self.closer.close_all().await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Close-all failed");
                self.shared.alerts.emit(
                    AlertSeverity::Critical,
                    "Exit close failed",
                    format!("close-all error: {e}"),
                );
                return;
            }
        };
        if !report.success() {
            self.shared.alerts.emit(
                AlertSeverity::Critical,
                "Exit incomplete",
                format!("{} positions remain after close-all", report.remaining.len()),
            );
        }

        self.book_closed_deals(close_started).await;

        let mut core = self.shared.core.lock().await;
        // Archive before wiping so the audit trail survives.
        let spread_ids: Vec<SpreadId> = core.unified.states().keys().cloned().collect();
        for spread_id in &spread_ids {
            if let Err(e) = self.shared.store.archive_spread(spread_id, "spread_closed") {
                error!(error = %e, "Failed to archive closed spread");
            }
            core.attribution.unregister_position(spread_id);
        }
        full_internal_cleanup(&mut core, &self.shared, "Exit complete");
        info!(closed = report.total_closed, "Exit complete, engine idle");
    }

    async fn handle_entry_or_pyramid(
        &mut self,
        snapshot: MarketSnapshot,
        entry_side: Option<SpreadSide>,
        current_side: Option<SpreadSide>,
        spread_id: Option<SpreadId>,
    ) {
        let mut core = self.shared.core.lock().await;
        let crate::app::TradingCore {
            unified,
            registry,
            attribution,
            lock,
            ..
        } = &mut *core;

        let mut ctx = ExecutionContext {
            registry,
            attribution,
            trading_locked: lock.is_locked(),
        };

        match unified
            .check_and_execute(
                &snapshot,
                entry_side,
                current_side,
                spread_id.as_ref(),
                &mut ctx,
            )
            .await
        {
            Ok(true) => info!("Position executed"),
            Ok(false) => {}
            Err(ExecutorError::HedgeViolation {
                filled_symbol,
                filled_ticket,
                failed_symbol,
                reason,
                ..
            }) => {
                error!(
                    filled_symbol,
                    filled_ticket, failed_symbol, reason, "UNHEDGED INCIDENT"
                );
                self.shared.alerts.emit(
                    AlertSeverity::Critical,
                    "Unhedged incident",
                    format!(
                        "{filled_symbol} filled (ticket {filled_ticket}) but {failed_symbol} failed: {reason}"
                    ),
                );
            }
            Err(e) => error!(error = %e, "Entry/pyramid execution failed"),
        }
    }

    async fn handle_rebalance(&mut self, adjustment: VolumeAdjustment, snapshot: MarketSnapshot) {
        info!(
            spread_id = %adjustment.spread_id.prefix(),
            symbol = %adjustment.symbol,
            action = %adjustment.action,
            quantity = %adjustment.quantity,
            reason = %adjustment.reason,
            "Single-leg volume correction (position count will go odd)"
        );

        let mut core = self.shared.core.lock().await;
        let comment = format!("VOL_REBAL:{}", adjustment.spread_id.prefix());
        let result = match core
            .unified
            .trade()
            .place_market_order(
                &adjustment.symbol,
                adjustment.action,
                adjustment.quantity,
                &comment,
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Volume correction failed");
                return;
            }
        };

        let is_primary = adjustment.symbol == self.shared.primary_spec.symbol;
        let now = Utc::now();
        let position_id = PositionId::random();
        core.registry.insert(TrackedLeg {
            position_id: position_id.clone(),
            spread_id: adjustment.spread_id.clone(),
            ticket: result.ticket,
            symbol: adjustment.symbol.clone(),
            action: adjustment.action,
            volume: result.volume,
            entry_price: result.price,
            entry_time: now,
            entry_zscore: snapshot.zscore,
            hedge_ratio: adjustment.new_hedge,
            is_primary,
            unrealized_pnl: 0.0,
            current_price: result.price,
        });
        if let Err(e) = self.shared.store.save_position(&PersistedPosition {
            position_id,
            spread_id: adjustment.spread_id.clone(),
            broker_ticket: result.ticket,
            symbol: adjustment.symbol.clone(),
            side: adjustment.action,
            volume: result.volume,
            entry_price: result.price,
            entry_time: now,
            entry_zscore: snapshot.zscore,
            hedge_ratio: adjustment.new_hedge,
            is_primary,
            created_at: now,
            last_updated: now,
        }) {
            error!(error = %e, "Failed to persist rebalance leg");
        }
        self.shared.monitor_watch.register(result.ticket);
        self.shared.risk_watch.register(result.ticket);
        core.rebalancer.mark_adjusted(&adjustment.spread_id, now);

        info!(ticket = result.ticket, "Volume correction complete");
    }

    /// Fold just-closed deals into the daily counters.
    async fn book_closed_deals(&self, since: DateTime<Utc>) {
        let deals = match self.shared.broker.history_deals(since, Utc::now()).await {
            Ok(deals) => deals,
            Err(e) => {
                warn!(error = %e, "Failed to fetch deals after close");
                return;
            }
        };
        let mut core = self.shared.core.lock().await;
        for deal in deals {
            if deal.entry == statarb_broker::DealEntry::Out && deal.magic == self.shared.magic {
                core.daily.update_realized(deal.profit, deal.commission);
            }
        }
    }
}
