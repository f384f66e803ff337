//! Startup-recovery scenarios against the simulated broker.

mod common;

use chrono::Utc;
use common::{seeded_broker, test_config, MAGIC, PRIMARY, SECONDARY};
use rust_decimal_macros::dec;
use statarb_bot::Engine;
use statarb_broker::{Broker, OrderRequest, SimBroker};
use statarb_core::{
    Lots, OrderAction, PositionId, Price, SpreadEntryState, SpreadId, SpreadSide,
};
use statarb_persistence::{
    PersistedPosition, PositionStore, SetupFlagManager, SpreadStateFile,
};
use std::collections::BTreeMap;
use std::path::Path;

fn persisted_leg(
    spread_id: &SpreadId,
    ticket: u64,
    symbol: &str,
    side: OrderAction,
    volume: &str,
    is_primary: bool,
) -> PersistedPosition {
    let now = Utc::now();
    PersistedPosition {
        position_id: PositionId::random(),
        spread_id: spread_id.clone(),
        broker_ticket: ticket,
        symbol: symbol.to_string(),
        side,
        volume: Lots::new(volume.parse().unwrap()),
        entry_price: Price::new(dec!(2153.5)),
        entry_time: now,
        entry_zscore: -2.1,
        hedge_ratio: 2.0,
        is_primary,
        created_at: now,
        last_updated: now,
    }
}

/// Open both legs on the sim broker, returning their tickets.
async fn open_spread_on_broker(broker: &SimBroker) -> (u64, u64) {
    let primary = broker
        .order_send(OrderRequest::market(
            PRIMARY,
            OrderAction::Buy,
            Lots::new(dec!(1)),
            MAGIC,
            "SPREAD:NEW",
        ))
        .await
        .unwrap();
    let secondary = broker
        .order_send(OrderRequest::market(
            SECONDARY,
            OrderAction::Sell,
            Lots::new(dec!(0.5)),
            MAGIC,
            &format!("SPREAD:{}", primary.ticket),
        ))
        .await
        .unwrap();
    (primary.ticket, secondary.ticket)
}

fn seed_persistence(data_dir: &Path, spread_id: &SpreadId, tickets: (u64, u64)) {
    let store = PositionStore::new(data_dir.join("positions")).unwrap();
    store
        .save_position(&persisted_leg(
            spread_id,
            tickets.0,
            PRIMARY,
            OrderAction::Buy,
            "1",
            true,
        ))
        .unwrap();
    store
        .save_position(&persisted_leg(
            spread_id,
            tickets.1,
            SECONDARY,
            OrderAction::Sell,
            "0.5",
            false,
        ))
        .unwrap();

    let flag = SetupFlagManager::new(data_dir.join("asset")).unwrap();
    flag.mark_setup_active(spread_id, serde_json::json!({"side": "LONG"}))
        .unwrap();
}

#[tokio::test]
async fn recovery_restores_ladder_from_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let broker = seeded_broker();
    let tickets = open_spread_on_broker(&broker).await;
    let spread_id = SpreadId::from_tickets(tickets.0, tickets.1);

    seed_persistence(dir.path(), &spread_id, tickets);

    // The grid had already pyramided to (-2.6, -3.1) before the crash.
    let state_file = SpreadStateFile::new(dir.path().join("asset").join("state")).unwrap();
    let mut states = BTreeMap::new();
    states.insert(
        spread_id.clone(),
        SpreadEntryState {
            spread_id: spread_id.clone(),
            side: SpreadSide::Long,
            last_z_entry: -2.6,
            next_z_entry: -3.1,
            entry_count: 2,
            total_primary_lots: Lots::new(dec!(2)),
            total_secondary_lots: Lots::new(dec!(1)),
            first_entry_spread_mean: 0.4,
        },
    );
    state_file.save(&states).unwrap();

    let engine = Engine::new(test_config(dir.path()), broker.clone()).await.unwrap();
    engine.recover().await.unwrap();

    let core = engine.core().lock().await;
    let state = core.unified.state(&spread_id).expect("state restored");
    assert!((state.last_z_entry + 2.6).abs() < 1e-9);
    assert!((state.next_z_entry + 3.1).abs() < 1e-9);
    assert_eq!(state.entry_count, 2);

    assert_eq!(core.registry.len(), 2);
    assert_eq!(core.registry.current_side(PRIMARY), Some(SpreadSide::Long));
    assert!(core.attribution.is_registered(&spread_id));
    // Positions untouched on the broker.
    assert_eq!(broker.open_position_count(), 2);
}

#[tokio::test]
async fn recovery_reconstructs_state_from_entry_zscore() {
    let dir = tempfile::tempdir().unwrap();
    let broker = seeded_broker();
    let tickets = open_spread_on_broker(&broker).await;
    let spread_id = SpreadId::from_tickets(tickets.0, tickets.1);

    // Persisted legs but no state file: fall back to the entry z-score.
    seed_persistence(dir.path(), &spread_id, tickets);

    let engine = Engine::new(test_config(dir.path()), broker).await.unwrap();
    engine.recover().await.unwrap();

    let core = engine.core().lock().await;
    let state = core.unified.state(&spread_id).expect("state reconstructed");
    assert!((state.last_z_entry + 2.1).abs() < 1e-9);
    assert!((state.next_z_entry + 2.6).abs() < 1e-9);
    assert_eq!(state.entry_count, 1);
}

#[tokio::test]
async fn recovery_archives_positions_closed_offline() {
    let dir = tempfile::tempdir().unwrap();
    let broker = seeded_broker();
    // Persisted legs point at tickets that no longer exist on the broker.
    let spread_id = SpreadId::from_tickets(501, 502);
    seed_persistence(dir.path(), &spread_id, (501, 502));

    let engine = Engine::new(test_config(dir.path()), broker).await.unwrap();
    engine.recover().await.unwrap();

    let core = engine.core().lock().await;
    assert!(!core.unified.has_states());
    assert!(core.registry.is_empty());

    let store = PositionStore::new(dir.path().join("positions")).unwrap();
    assert!(store.load_active().is_empty());
    assert_eq!(store.history_count(), 1);

    let flag = SetupFlagManager::new(dir.path().join("asset")).unwrap();
    assert!(!flag.is_setup_active());
}

#[tokio::test]
async fn recovery_fails_closed_on_partial_loss() {
    let dir = tempfile::tempdir().unwrap();
    let broker = seeded_broker();
    let tickets = open_spread_on_broker(&broker).await;
    let spread_id = SpreadId::from_tickets(tickets.0, tickets.1);
    seed_persistence(dir.path(), &spread_id, tickets);

    // One leg vanishes (closed manually while the engine was down).
    assert!(broker.close_position_externally(tickets.1));
    assert_eq!(broker.open_position_count(), 1);

    let engine = Engine::new(test_config(dir.path()), broker.clone()).await.unwrap();
    engine.recover().await.unwrap();

    // The surviving leg was closed rather than left unhedged.
    assert_eq!(broker.open_position_count(), 0);

    let core = engine.core().lock().await;
    assert!(!core.unified.has_states());
    assert!(core.registry.is_empty());

    let flag = SetupFlagManager::new(dir.path().join("asset")).unwrap();
    assert!(!flag.is_setup_active());
}

#[tokio::test]
async fn recovery_without_flag_is_idle() {
    let dir = tempfile::tempdir().unwrap();
    let broker = seeded_broker();

    let engine = Engine::new(test_config(dir.path()), broker).await.unwrap();
    engine.recover().await.unwrap();

    let core = engine.core().lock().await;
    assert!(!core.unified.has_states());
    assert!(core.registry.is_empty());
}

#[tokio::test]
async fn recovery_migrates_legacy_last_z_file() {
    let dir = tempfile::tempdir().unwrap();
    let broker = seeded_broker();

    let state_dir = dir.path().join("asset").join("state");
    std::fs::create_dir_all(&state_dir).unwrap();
    std::fs::write(
        state_dir.join("last_z_entry.json"),
        serde_json::json!({"long": {"zscore": -2.3}, "short": null}).to_string(),
    )
    .unwrap();

    let engine = Engine::new(test_config(dir.path()), broker).await.unwrap();
    engine.recover().await.unwrap();

    let core = engine.core().lock().await;
    let states = core.unified.states();
    assert_eq!(states.len(), 1);
    let state = states.values().next().unwrap();
    assert_eq!(state.side, SpreadSide::Long);
    assert!((state.last_z_entry + 2.3).abs() < 1e-9);
    assert!((state.next_z_entry + 2.8).abs() < 1e-9);
    assert_eq!(state.entry_count, 1);
}
