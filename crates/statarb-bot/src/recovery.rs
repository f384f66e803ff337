//! Startup recovery.
//!
//! Reconciles on-disk intent (setup flag, persisted legs, grid state)
//! against live broker positions before any worker starts:
//!
//! - flag inactive: idle start
//! - flag active, no persisted legs: clear the flag, idle start
//! - records whose ticket no longer exists are pruned from the active
//!   file up front; the classification below works from the pre-prune
//!   snapshot so whole-spread outcomes can still be archived
//! - every persisted ticket gone from the broker: archive as closed
//!   offline and reset the grid (the trading lock is independent and
//!   follows only its own session rule)
//! - every ticket present: rebuild the registries and watches, restoring
//!   `last_z_entry` from the state file when it exists (the ladder
//!   survives restarts) and falling back to the persisted entry z-score
//! - some tickets missing: incomplete hedge, close everything (fail closed)
//!
//! Also migrates state from the legacy `last_z_entry.json` layout when no
//! grid state file exists.

use crate::app::TradingCore;
use crate::error::AppResult;
use chrono::Utc;
use serde::Deserialize;
use statarb_attribution::PositionSnapshot;
use statarb_broker::DynBroker;
use statarb_core::{Lots, OrderAction, SpreadEntryState, SpreadId, SpreadSide};
use statarb_executor::CloseManager;
use statarb_persistence::{PersistedPosition, PositionStore, SetupFlagManager};
use statarb_position::{TicketWatch, TrackedLeg};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
struct LegacyZEntry {
    zscore: f64,
}

#[derive(Debug, Deserialize)]
struct LegacyZFile {
    #[serde(default)]
    long: Option<LegacyZEntry>,
    #[serde(default)]
    short: Option<LegacyZEntry>,
}

#[allow(clippy::too_many_arguments)]
pub async fn run_recovery(
    broker: &DynBroker,
    core: &mut TradingCore,
    store: &PositionStore,
    flag: &SetupFlagManager,
    monitor_watch: &TicketWatch,
    risk_watch: &TicketWatch,
    magic: u32,
    scale_interval: f64,
    state_dir: &Path,
) -> AppResult<()> {
    info!("Position recovery: checking for saved state");

    if !core.unified.has_states() {
        migrate_legacy_last_z(core, scale_interval, state_dir)?;
    }

    // Step 1: the setup flag gates everything.
    if !flag.is_setup_active() {
        info!("No active setup flag, starting fresh");
        return Ok(());
    }
    if let Some(setup) = flag.setup_info() {
        info!(
            spread_id = ?setup.spread_id,
            activated_at = ?setup.activated_at,
            "Active setup flag detected, reconciling with the broker"
        );
    }

    // Step 2: persisted legs.
    let persisted = store.load_active();
    if persisted.is_empty() {
        warn!("Setup flag active but no persisted positions, clearing flag");
        flag.mark_setup_inactive("No positions found")?;
        return Ok(());
    }
    info!(count = persisted.len(), "Found persisted positions");

    // Step 3: compare against broker truth.
    let live = broker.positions(Some(magic)).await?;
    let live_tickets: HashSet<u64> = live.iter().map(|p| p.ticket).collect();
    let saved_tickets: HashSet<u64> = persisted.values().map(|p| p.broker_ticket).collect();
    let missing: HashSet<u64> = saved_tickets.difference(&live_tickets).copied().collect();

    // Prune records whose ticket no longer exists before anything is
    // rebuilt from the file. The `persisted` snapshot above keeps the
    // pre-prune view for classification and archiving.
    let pruned = store.cleanup_orphaned(&live_tickets)?;
    if pruned > 0 {
        warn!(pruned, "Dropped orphaned position records");
    }

    let spreads = group_by_spread(&persisted);

    // Step 4: everything closed while we were down. The trading lock is
    // deliberately untouched here; it obeys only its own session rule.
    if live_tickets.is_empty() {
        warn!(
            saved = saved_tickets.len(),
            "All persisted positions closed offline"
        );
        for (spread_id, legs) in &spreads {
            store.archive_records(spread_id, records_for(legs), "all_closed_offline")?;
        }
        core.unified.reset_all()?;
        flag.mark_setup_inactive("All positions closed offline")?;
        info!("Cleanup complete, ready for fresh entries");
        return Ok(());
    }

    // Step 6: partial loss. An incomplete hedge is not worth keeping:
    // archive and close everything that remains.
    if !missing.is_empty() {
        error!(missing = ?missing, "Incomplete setup: some legs are gone");
        for (spread_id, legs) in &spreads {
            let all_gone = legs.iter().all(|l| missing.contains(&l.broker_ticket));
            let reason = if all_gone {
                "both_legs_manually_closed"
            } else {
                "partial_spread_detected"
            };
            store.archive_records(spread_id, records_for(legs), reason)?;
        }

        warn!("Closing all remaining positions to avoid unhedged risk");
        let report = CloseManager::new(broker.clone(), magic).close_all().await?;
        if !report.success() {
            error!(remaining = ?report.remaining, "Recovery close-all incomplete");
        }

        core.registry.clear();
        core.unified.reset_all()?;
        store.clear_all()?;
        flag.mark_setup_inactive("Incomplete setup closed during recovery")?;
        return Ok(());
    }

    // Step 5: everything is still there; restore the full picture.
    info!("All persisted positions found on the broker, restoring");
    let profit_by_ticket: HashMap<u64, f64> = live.iter().map(|p| (p.ticket, p.profit)).collect();

    for position in persisted.values() {
        core.registry.insert(TrackedLeg {
            position_id: position.position_id.clone(),
            spread_id: position.spread_id.clone(),
            ticket: position.broker_ticket,
            symbol: position.symbol.clone(),
            action: position.side,
            volume: position.volume,
            entry_price: position.entry_price,
            entry_time: position.entry_time,
            entry_zscore: position.entry_zscore,
            hedge_ratio: position.hedge_ratio,
            is_primary: position.is_primary,
            unrealized_pnl: profit_by_ticket
                .get(&position.broker_ticket)
                .copied()
                .unwrap_or(0.0),
            current_price: position.entry_price,
        });
        monitor_watch.register(position.broker_ticket);
        risk_watch.register(position.broker_ticket);
    }

    for (spread_id, legs) in &spreads {
        restore_spread(core, spread_id, legs, scale_interval);
    }

    info!(
        spreads = spreads.len(),
        legs = persisted.len(),
        "Recovery complete, resuming with existing positions"
    );
    Ok(())
}

fn group_by_spread(
    persisted: &BTreeMap<String, PersistedPosition>,
) -> BTreeMap<SpreadId, Vec<&PersistedPosition>> {
    let mut spreads: BTreeMap<SpreadId, Vec<&PersistedPosition>> = BTreeMap::new();
    for position in persisted.values() {
        spreads
            .entry(position.spread_id.clone())
            .or_default()
            .push(position);
    }
    spreads
}

/// Owned records for one spread, keyed like the active file.
fn records_for(legs: &[&PersistedPosition]) -> BTreeMap<String, PersistedPosition> {
    legs.iter()
        .map(|p| (p.position_id.as_str().to_string(), (*p).clone()))
        .collect()
}

/// Rebuild the grid state and attribution entry for one surviving spread.
fn restore_spread(
    core: &mut TradingCore,
    spread_id: &SpreadId,
    legs: &[&PersistedPosition],
    scale_interval: f64,
) {
    let primary = legs.iter().find(|l| l.is_primary);
    let secondary = legs.iter().find(|l| !l.is_primary);

    let side = match primary.map(|p| p.side) {
        Some(OrderAction::Buy) => SpreadSide::Long,
        Some(OrderAction::Sell) => SpreadSide::Short,
        // No primary leg persisted (rebalance remnant); judge from the
        // secondary, which trades opposite.
        None => match secondary.map(|s| s.side) {
            Some(OrderAction::Sell) => SpreadSide::Long,
            _ => SpreadSide::Short,
        },
    };

    let total_primary: Lots = legs
        .iter()
        .filter(|l| l.is_primary)
        .fold(Lots::ZERO, |acc, l| acc + l.volume);
    let total_secondary: Lots = legs
        .iter()
        .filter(|l| !l.is_primary)
        .fold(Lots::ZERO, |acc, l| acc + l.volume);

    // The state file is the authority on the ladder position; the
    // persisted entry z-score is only a fallback.
    if core.unified.state(spread_id).is_none() {
        let entry_zscore = legs.first().map(|l| l.entry_zscore).unwrap_or(0.0);
        let state = SpreadEntryState {
            spread_id: spread_id.clone(),
            side,
            last_z_entry: entry_zscore,
            next_z_entry: SpreadEntryState::project_next(side, entry_zscore, scale_interval),
            entry_count: 1,
            total_primary_lots: total_primary,
            total_secondary_lots: total_secondary,
            first_entry_spread_mean: 0.0,
        };
        warn!(
            spread_id = %spread_id.prefix(),
            last_z = state.last_z_entry,
            next_z = state.next_z_entry,
            "No grid state on file, reconstructed from the persisted entry"
        );
        if let Err(e) = core.unified.restore_state(state) {
            error!(error = %e, "Failed to persist reconstructed state");
        }
    } else {
        info!(
            spread_id = %spread_id.prefix(),
            "Grid state restored from file (ladder position preserved)"
        );
    }

    // Attribution entry snapshot, rebuilt from the stored fills.
    if let (Some(primary), Some(secondary)) = (primary, secondary) {
        let mean = core
            .unified
            .state(spread_id)
            .map(|s| s.first_entry_spread_mean)
            .unwrap_or(0.0);
        let primary_price = primary.entry_price.to_f64();
        let secondary_price = secondary.entry_price.to_f64();
        core.attribution.register_position(
            spread_id.clone(),
            PositionSnapshot {
                timestamp: primary.entry_time,
                primary_bid: primary_price,
                primary_ask: primary_price,
                secondary_bid: secondary_price,
                secondary_ask: secondary_price,
                spread: primary_price - primary.hedge_ratio * secondary_price,
                mean,
                std: 0.0,
                zscore: primary.entry_zscore,
                hedge_ratio: primary.hedge_ratio,
                primary_volume: total_primary.to_f64(),
                secondary_volume: total_secondary.to_f64(),
                side,
                primary_price,
                secondary_price,
                primary_contract: core.unified.trade().primary_spec().contract_size,
                secondary_contract: core.unified.trade().secondary_spec().contract_size,
            },
        );
    }
}

/// One-time migration from the legacy per-side `last_z_entry.json` file.
fn migrate_legacy_last_z(
    core: &mut TradingCore,
    scale_interval: f64,
    state_dir: &Path,
) -> AppResult<()> {
    let legacy_path = state_dir.join("last_z_entry.json");
    if !legacy_path.exists() {
        return Ok(());
    }
    let Ok(bytes) = std::fs::read(&legacy_path) else {
        return Ok(());
    };
    let Ok(legacy) = serde_json::from_slice::<LegacyZFile>(&bytes) else {
        warn!("Legacy last_z_entry.json unreadable, skipping migration");
        return Ok(());
    };

    let mut migrated = 0usize;
    for (entry, side) in [
        (legacy.long, SpreadSide::Long),
        (legacy.short, SpreadSide::Short),
    ] {
        let Some(entry) = entry else { continue };
        let state = SpreadEntryState {
            spread_id: SpreadId::random(),
            side,
            last_z_entry: entry.zscore,
            next_z_entry: SpreadEntryState::project_next(side, entry.zscore, scale_interval),
            entry_count: 1,
            // Volumes are unknown in the legacy layout; they fill in on the
            // next execution.
            total_primary_lots: Lots::ZERO,
            total_secondary_lots: Lots::ZERO,
            first_entry_spread_mean: 0.0,
        };
        warn!(
            %side,
            last_z = entry.zscore,
            next_z = state.next_z_entry,
            "Migrated legacy grid state"
        );
        core.unified.restore_state(state)?;
        migrated += 1;
    }
    if migrated > 0 {
        info!(migrated, at = %Utc::now(), "Legacy state migration complete");
    }
    Ok(())
}
