//! Unified position executor: the 2-variable grid.
//!
//! One rule covers initial entries and pyramids. For every side there is
//! at most one active `SpreadEntryState`; its two scalars `last_z_entry`
//! and `next_z_entry` fully describe when the next fill happens:
//!
//! - first entry: fires on the classifier's entry signal, creates the state
//! - pyramid: LONG fires at `z <= next_z_entry`, SHORT at `z >= next_z_entry`
//!   (ties fire), advancing both scalars one interval further from the mean
//!
//! Because `next_z_entry` only ever moves further out, oscillation around a
//! prior fill cannot re-trigger; no cooldown is needed. State is persisted
//! on every mutation.

use crate::error::{ExecutorError, ExecutorResult};
use crate::trade::{SpreadOrderOutcome, TradeExecutor};
use chrono::Utc;
use statarb_attribution::{AttributionEngine, PositionSnapshot};
use statarb_core::{Lots, MarketSnapshot, PositionId, SpreadEntryState, SpreadId, SpreadSide};
use statarb_market::hedge_quantities;
use statarb_persistence::{PersistedPosition, PositionStore, SetupFlagManager, SpreadStateFile};
use statarb_position::{PositionRegistry, TicketWatch, TrackedLeg};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Grid parameters.
#[derive(Debug, Clone, Copy)]
pub struct UnifiedConfig {
    pub entry_threshold: f64,
    /// Z-score gap between successive fills.
    pub scale_interval: f64,
    /// No fills beyond this |z|.
    pub max_zscore: f64,
    /// Fraction of balance deployed per fill.
    pub initial_fraction: f64,
    pub max_entries: u32,
}

/// Mutable views into the sibling components the executor updates on fill.
pub struct ExecutionContext<'a> {
    pub registry: &'a mut PositionRegistry,
    pub attribution: &'a mut AttributionEngine,
    pub trading_locked: bool,
}

/// The grid state machine.
pub struct UnifiedExecutor {
    trade: TradeExecutor,
    config: UnifiedConfig,
    account_balance: f64,
    states: BTreeMap<SpreadId, SpreadEntryState>,
    state_file: SpreadStateFile,
    store: Arc<PositionStore>,
    flag: Arc<SetupFlagManager>,
    monitor_watch: TicketWatch,
    risk_watch: TicketWatch,
}

impl UnifiedExecutor {
    /// Build the executor and restore any grid state left on disk.
    pub fn new(
        trade: TradeExecutor,
        config: UnifiedConfig,
        state_file: SpreadStateFile,
        store: Arc<PositionStore>,
        flag: Arc<SetupFlagManager>,
        monitor_watch: TicketWatch,
        risk_watch: TicketWatch,
    ) -> Self {
        let states = state_file.load();
        if !states.is_empty() {
            info!(count = states.len(), "Restored spread states from disk");
            for state in states.values() {
                info!("  {state}");
            }
        }
        info!(
            entry_threshold = config.entry_threshold,
            scale_interval = config.scale_interval,
            max_zscore = config.max_zscore,
            initial_fraction = config.initial_fraction,
            max_entries = config.max_entries,
            "Unified executor ready (2-variable grid)"
        );
        Self {
            trade,
            config,
            account_balance: 0.0,
            states,
            state_file,
            store,
            flag,
            monitor_watch,
            risk_watch,
        }
    }

    #[must_use]
    pub fn config(&self) -> &UnifiedConfig {
        &self.config
    }

    /// Order-placement layer, shared with the rebalance path.
    #[must_use]
    pub fn trade(&self) -> &TradeExecutor {
        &self.trade
    }

    pub fn set_max_zscore(&mut self, max_zscore: f64) {
        self.config.max_zscore = max_zscore;
    }

    #[must_use]
    pub fn states(&self) -> &BTreeMap<SpreadId, SpreadEntryState> {
        &self.states
    }

    #[must_use]
    pub fn state(&self, spread_id: &SpreadId) -> Option<&SpreadEntryState> {
        self.states.get(spread_id)
    }

    #[must_use]
    pub fn has_states(&self) -> bool {
        !self.states.is_empty()
    }

    pub fn update_balance(&mut self, balance: f64) {
        self.account_balance = balance;
    }

    /// Install a recovered state (startup reconciliation).
    pub fn restore_state(&mut self, state: SpreadEntryState) -> ExecutorResult<()> {
        info!("Restoring grid state: {state}");
        self.states.insert(state.spread_id.clone(), state);
        self.save_states()
    }

    /// Main decision point, called for every snapshot.
    ///
    /// Returns true when an order executed.
    pub async fn check_and_execute(
        &mut self,
        snapshot: &MarketSnapshot,
        entry_side: Option<SpreadSide>,
        current_side: Option<SpreadSide>,
        spread_id: Option<&SpreadId>,
        ctx: &mut ExecutionContext<'_>,
    ) -> ExecutorResult<bool> {
        // No position: a classified entry signal may open, but only when no
        // state (real or sentinel) exists. This is the duplicate-entry lock.
        if current_side.is_none() {
            if let Some(side) = entry_side {
                if self.states.is_empty() {
                    return self.execute_entry(side, snapshot, ctx).await;
                }
                return Ok(false);
            }
            return Ok(false);
        }

        // Position open: pyramid check against the grid.
        if let Some(spread_id) = spread_id {
            if self.states.contains_key(spread_id) {
                return self.execute_pyramid(spread_id.clone(), snapshot, ctx).await;
            }
        }
        Ok(false)
    }

    async fn execute_entry(
        &mut self,
        side: SpreadSide,
        snapshot: &MarketSnapshot,
        ctx: &mut ExecutionContext<'_>,
    ) -> ExecutorResult<bool> {
        if ctx.trading_locked {
            warn!("Entry blocked: trading is locked");
            return Ok(false);
        }
        let current_z = snapshot.zscore;
        info!(%side, zscore = current_z, "Initial entry triggered");

        // Sentinel first: concurrent snapshots must not race into a second
        // first entry while orders are in flight.
        let sentinel = SpreadEntryState::sentinel(side, current_z, self.config.scale_interval);
        let sentinel_id = sentinel.spread_id.clone();
        self.states.insert(sentinel_id.clone(), sentinel);

        let sized = self.position_size(snapshot);
        let (primary_lots, secondary_lots) = match sized {
            Ok(volumes) => volumes,
            Err(e) => {
                self.states.remove(&sentinel_id);
                return Err(e);
            }
        };

        let outcome = match self
            .trade
            .place_spread_orders(side, primary_lots, secondary_lots, current_z)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.states.remove(&sentinel_id);
                if let ExecutorError::HedgeViolation {
                    ref filled_symbol,
                    ref filled,
                    ..
                } = e
                {
                    // Keep the filled leg visible everywhere; recovery or the
                    // risk supervisor resolves it.
                    self.record_unhedged_leg(filled_symbol, filled, side, snapshot, ctx);
                }
                error!(error = %e, "Entry orders failed, sentinel removed");
                return Err(e);
            }
        };

        self.states.remove(&sentinel_id);

        let state = SpreadEntryState::first_entry(
            outcome.spread_id.clone(),
            side,
            current_z,
            self.config.scale_interval,
            outcome.primary.volume,
            outcome.secondary.volume,
            snapshot.spread_mean,
        );
        info!("State created: {state}");
        self.states.insert(outcome.spread_id.clone(), state);

        self.register_fill(side, snapshot, &outcome, true, ctx)?;
        self.save_states()?;
        Ok(true)
    }

    async fn execute_pyramid(
        &mut self,
        spread_id: SpreadId,
        snapshot: &MarketSnapshot,
        ctx: &mut ExecutionContext<'_>,
    ) -> ExecutorResult<bool> {
        let current_z = snapshot.zscore;
        let config = self.config;

        let Some(state) = self.states.get_mut(&spread_id) else {
            return Ok(false);
        };

        if state.entry_count >= config.max_entries {
            debug!(spread_id = %spread_id.prefix(), "Max entries reached");
            return Ok(false);
        }
        if current_z.abs() >= config.max_zscore.abs() {
            warn!(zscore = current_z, max = config.max_zscore, "Max z-score reached");
            return Ok(false);
        }

        let triggered = match state.side {
            SpreadSide::Long => current_z <= state.next_z_entry,
            SpreadSide::Short => current_z >= state.next_z_entry,
        };
        if !triggered {
            debug!(
                spread_id = %spread_id.prefix(),
                zscore = current_z,
                next = state.next_z_entry,
                "Pyramid waiting"
            );
            return Ok(false);
        }

        if ctx.trading_locked {
            warn!("Pyramid blocked: trading is locked");
            return Ok(false);
        }

        let side = state.side;
        info!(
            spread_id = %spread_id.prefix(),
            %side,
            zscore = current_z,
            crossed = state.next_z_entry,
            entry = state.entry_count + 1,
            "Pyramid triggered"
        );

        // Pre-commit: advance the grid before sending, so a transient
        // failure cannot double-fire this level. Rolled back on failure.
        let old_last = state.last_z_entry;
        let old_next = state.next_z_entry;
        state.last_z_entry = current_z;
        state.next_z_entry =
            SpreadEntryState::project_next(side, current_z, config.scale_interval);

        let sized = self.position_size(snapshot);
        let (primary_lots, secondary_lots) = match sized {
            Ok(volumes) => volumes,
            Err(e) => {
                self.rollback_grid(&spread_id, old_last, old_next);
                return Err(e);
            }
        };

        let primary_symbol = self.trade.primary_spec().symbol.clone();
        let secondary_symbol = self.trade.secondary_spec().symbol.clone();
        let comment = format!("PYRAMID:{}", spread_id.prefix());

        let primary = match self
            .trade
            .place_market_order(&primary_symbol, side.primary_action(), primary_lots, &comment)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.rollback_grid(&spread_id, old_last, old_next);
                error!(error = %e, "Pyramid primary leg failed, state rolled back");
                return Err(e);
            }
        };

        let secondary = match self
            .trade
            .place_market_order(
                &secondary_symbol,
                side.secondary_action(),
                secondary_lots,
                &comment,
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.rollback_grid(&spread_id, old_last, old_next);
                self.record_unhedged_leg(&primary_symbol, &primary, side, snapshot, ctx);
                error!(error = %e, "Pyramid secondary leg failed after primary fill");
                return Err(ExecutorError::HedgeViolation {
                    filled_symbol: primary_symbol,
                    filled_ticket: primary.ticket,
                    filled: Box::new(primary),
                    failed_symbol: secondary_symbol,
                    reason: e.to_string(),
                });
            }
        };

        let outcome = SpreadOrderOutcome {
            primary,
            secondary,
            spread_id: spread_id.clone(),
            entry_zscore: current_z,
        };
        self.register_fill(side, snapshot, &outcome, false, ctx)?;

        let state = self
            .states
            .get_mut(&spread_id)
            .expect("state present for the spread just pyramided");
        state.entry_count += 1;
        state.total_primary_lots = state.total_primary_lots + outcome.primary.volume;
        state.total_secondary_lots = state.total_secondary_lots + outcome.secondary.volume;
        info!(
            "State updated: {} (was last_z={:.3})",
            self.states[&spread_id], old_last
        );

        self.save_states()?;
        Ok(true)
    }

    /// Delete the state for a spread (called on exit). The file is
    /// rewritten even when it becomes empty.
    pub fn reset_state(&mut self, spread_id: &SpreadId) -> ExecutorResult<()> {
        if let Some(state) = self.states.remove(spread_id) {
            info!(
                spread_id = %spread_id.prefix(),
                entries = state.entry_count,
                last_z = state.last_z_entry,
                "Grid state reset"
            );
        }
        self.save_states()
    }

    /// Drop every state (emergency close, manual-closure cleanup).
    pub fn reset_all(&mut self) -> ExecutorResult<()> {
        if !self.states.is_empty() {
            info!(count = self.states.len(), "All grid states reset");
        }
        self.states.clear();
        self.save_states()
    }

    /// Runtime `scale_interval` change: re-anchor every active trigger from
    /// its unchanged `last_z_entry`.
    pub fn update_scale_interval(&mut self, new_interval: f64) -> ExecutorResult<()> {
        let old = self.config.scale_interval;
        self.config.scale_interval = new_interval;
        if self.states.is_empty() {
            info!(old, new = new_interval, "Scale interval updated");
            return Ok(());
        }
        for state in self.states.values_mut() {
            let old_next = state.next_z_entry;
            state.recompute_next(new_interval);
            info!(
                spread_id = %state.spread_id.prefix(),
                last_z = state.last_z_entry,
                old_next,
                new_next = state.next_z_entry,
                "Trigger recomputed for new scale interval"
            );
        }
        self.save_states()
    }

    fn rollback_grid(&mut self, spread_id: &SpreadId, old_last: f64, old_next: f64) {
        if let Some(state) = self.states.get_mut(spread_id) {
            state.last_z_entry = old_last;
            state.next_z_entry = old_next;
        }
    }

    /// Size one fill: `initial_fraction × balance` of primary notional,
    /// hedged per the current beta.
    fn position_size(&self, snapshot: &MarketSnapshot) -> ExecutorResult<(Lots, Lots)> {
        let primary_value = self.account_balance * self.config.initial_fraction;
        let contract = self.trade.primary_spec().contract_size;
        let primary_quantity = primary_value / snapshot.primary_bid / contract;

        let (primary, secondary) = hedge_quantities(
            primary_quantity,
            snapshot.hedge_ratio,
            self.trade.primary_spec(),
            self.trade.secondary_spec(),
        )?;
        if !primary.is_positive() {
            return Err(ExecutorError::VolumeTooSmall(
                self.trade.primary_spec().symbol.clone(),
            ));
        }
        if !secondary.is_positive() {
            return Err(ExecutorError::VolumeTooSmall(
                self.trade.secondary_spec().symbol.clone(),
            ));
        }
        Ok((primary, secondary))
    }

    /// Register a completed two-leg fill with every tracking system.
    fn register_fill(
        &mut self,
        side: SpreadSide,
        snapshot: &MarketSnapshot,
        outcome: &SpreadOrderOutcome,
        is_first_entry: bool,
        ctx: &mut ExecutionContext<'_>,
    ) -> ExecutorResult<()> {
        let now = Utc::now();

        for (result, spec, action, is_primary) in [
            (
                &outcome.primary,
                self.trade.primary_spec().clone(),
                side.primary_action(),
                true,
            ),
            (
                &outcome.secondary,
                self.trade.secondary_spec().clone(),
                side.secondary_action(),
                false,
            ),
        ] {
            let position_id = PositionId::random();
            ctx.registry.insert(TrackedLeg {
                position_id: position_id.clone(),
                spread_id: outcome.spread_id.clone(),
                ticket: result.ticket,
                symbol: spec.symbol.clone(),
                action,
                volume: result.volume,
                entry_price: result.price,
                entry_time: now,
                entry_zscore: outcome.entry_zscore,
                hedge_ratio: snapshot.hedge_ratio,
                is_primary,
                unrealized_pnl: 0.0,
                current_price: result.price,
            });
            self.store.save_position(&PersistedPosition {
                position_id,
                spread_id: outcome.spread_id.clone(),
                broker_ticket: result.ticket,
                symbol: spec.symbol.clone(),
                side: action,
                volume: result.volume,
                entry_price: result.price,
                entry_time: now,
                entry_zscore: outcome.entry_zscore,
                hedge_ratio: snapshot.hedge_ratio,
                is_primary,
                created_at: now,
                last_updated: now,
            })?;

            // Dual registration: monitor and risk each watch independently.
            self.monitor_watch.register(result.ticket);
            self.risk_watch.register(result.ticket);
        }

        if is_first_entry {
            ctx.attribution.register_position(
                outcome.spread_id.clone(),
                PositionSnapshot {
                    timestamp: now,
                    primary_bid: snapshot.primary_bid,
                    primary_ask: snapshot.primary_ask,
                    secondary_bid: snapshot.secondary_bid,
                    secondary_ask: snapshot.secondary_ask,
                    spread: snapshot.spread,
                    mean: snapshot.spread_mean,
                    std: snapshot.spread_std,
                    zscore: outcome.entry_zscore,
                    hedge_ratio: snapshot.hedge_ratio,
                    primary_volume: outcome.primary.volume.to_f64(),
                    secondary_volume: outcome.secondary.volume.to_f64(),
                    side,
                    primary_price: outcome.primary.price.to_f64(),
                    secondary_price: outcome.secondary.price.to_f64(),
                    primary_contract: self.trade.primary_spec().contract_size,
                    secondary_contract: self.trade.secondary_spec().contract_size,
                },
            );

            if !self.flag.is_setup_active() {
                self.flag.mark_setup_active(
                    &outcome.spread_id,
                    serde_json::json!({
                        "side": side.to_string(),
                        "entry_zscore": outcome.entry_zscore,
                    }),
                )?;
            }
        }
        Ok(())
    }

    /// Keep a lone filled leg visible after the other side failed.
    fn record_unhedged_leg(
        &self,
        symbol: &str,
        filled: &statarb_broker::OrderResult,
        side: SpreadSide,
        snapshot: &MarketSnapshot,
        ctx: &mut ExecutionContext<'_>,
    ) {
        let is_primary = symbol == self.trade.primary_spec().symbol;
        let action = if is_primary {
            side.primary_action()
        } else {
            side.secondary_action()
        };
        let spread_id = SpreadId(format!("{}-unhedged", filled.ticket));
        let now = Utc::now();
        let position_id = PositionId::random();

        ctx.registry.insert(TrackedLeg {
            position_id: position_id.clone(),
            spread_id: spread_id.clone(),
            ticket: filled.ticket,
            symbol: symbol.to_string(),
            action,
            volume: filled.volume,
            entry_price: filled.price,
            entry_time: now,
            entry_zscore: snapshot.zscore,
            hedge_ratio: snapshot.hedge_ratio,
            is_primary,
            unrealized_pnl: 0.0,
            current_price: filled.price,
        });
        if let Err(e) = self.store.save_position(&PersistedPosition {
            position_id,
            spread_id,
            broker_ticket: filled.ticket,
            symbol: symbol.to_string(),
            side: action,
            volume: filled.volume,
            entry_price: filled.price,
            entry_time: now,
            entry_zscore: snapshot.zscore,
            hedge_ratio: snapshot.hedge_ratio,
            is_primary,
            created_at: now,
            last_updated: now,
        }) {
            error!(error = %e, "Failed to persist unhedged leg");
        }
        self.monitor_watch.register(filled.ticket);
        self.risk_watch.register(filled.ticket);
    }

    fn save_states(&self) -> ExecutorResult<()> {
        self.state_file.save(&self.states)?;
        Ok(())
    }
}
