//! End-to-end engine scenarios on the simulated broker.

mod common;

use chrono::Utc;
use common::{
    seeded_broker, set_diverged_ticks, set_reverted_ticks, test_config, wait_for, MAGIC, PRIMARY,
};
use rust_decimal_macros::dec;
use statarb_bot::Engine;
use statarb_broker::{Broker, Deal, DealEntry, OrderRequest, SimBroker};
use statarb_core::{Lots, OrderAction, SpreadSide};
use statarb_persistence::SetupFlagManager;
use std::sync::Arc;
use std::time::Duration;

async fn started_engine(dir: &std::path::Path, broker: Arc<SimBroker>) -> Engine {
    let mut engine = Engine::new(test_config(dir), broker).await.unwrap();
    engine.recover().await.unwrap();
    engine.start().unwrap();
    engine
}

#[tokio::test]
async fn engine_enters_on_diverged_spread_and_exits_on_reversion() {
    let dir = tempfile::tempdir().unwrap();
    let broker = seeded_broker();
    set_diverged_ticks(&broker);

    let mut engine = started_engine(dir.path(), broker.clone()).await;

    // Deep negative z: the engine opens the two-leg LONG spread.
    let entered = wait_for(
        || broker.open_position_count() == 2,
        Duration::from_secs(5),
    )
    .await;
    assert!(entered, "engine never opened the spread");

    {
        let core = engine.core().lock().await;
        assert_eq!(core.unified.states().len(), 1);
        let state = core.unified.states().values().next().unwrap();
        assert_eq!(state.side, SpreadSide::Long);
        assert_eq!(state.entry_count, 1);
        assert!(state.last_z_entry < -2.0);
        assert!(state.next_z_entry < state.last_z_entry);
        assert_eq!(core.registry.current_side(PRIMARY), Some(SpreadSide::Long));
    }
    let flag = SetupFlagManager::new(dir.path().join("asset")).unwrap();
    assert!(flag.is_setup_active());

    // Reversion into the exit band closes everything and re-idles.
    set_reverted_ticks(&broker);
    let exited = wait_for(
        || broker.open_position_count() == 0,
        Duration::from_secs(5),
    )
    .await;
    assert!(exited, "engine never closed the spread");

    let cleaned = wait_for(
        || {
            engine
                .core()
                .try_lock()
                .map(|core| !core.unified.has_states() && core.registry.is_empty())
                .unwrap_or(false)
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(cleaned, "internal state was not reset after exit");
    assert!(!flag.is_setup_active());

    engine.shutdown().await;
}

#[tokio::test]
async fn engine_resets_after_manual_closure() {
    let dir = tempfile::tempdir().unwrap();
    let broker = seeded_broker();
    set_diverged_ticks(&broker);

    let mut engine = started_engine(dir.path(), broker.clone()).await;

    assert!(
        wait_for(
            || broker.open_position_count() == 2,
            Duration::from_secs(5)
        )
        .await
    );

    // Operator closes both legs from the terminal.
    set_reverted_ticks(&broker); // keep z inside the hold band, not exit
    broker.set_tick(PRIMARY, 2188.0, 2188.5); // z mildly negative, no signal
    for ticket in broker.position_tickets() {
        assert!(broker.close_position_externally(ticket));
    }

    // The risk supervisor notices the vanished tickets and re-idles.
    let cleaned = wait_for(
        || {
            engine
                .core()
                .try_lock()
                .map(|core| !core.unified.has_states() && core.registry.is_empty())
                .unwrap_or(false)
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(cleaned, "manual closure was not detected");

    let flag = SetupFlagManager::new(dir.path().join("asset")).unwrap();
    assert!(!flag.is_setup_active());

    engine.shutdown().await;
}

#[tokio::test]
async fn daily_limit_breach_closes_all_and_locks_until_next_session() {
    let dir = tempfile::tempdir().unwrap();
    let broker = seeded_broker();
    // Neutral market: no signals fire during this scenario.
    set_reverted_ticks(&broker);

    // Prior closures this session realized -2500 net; equity currently
    // 7500, so the reconstructed starting balance is 10000 and the 10%
    // daily limit is 1000.
    broker.set_balance(7_500.0);
    broker.push_deal(Deal {
        ticket: 9001,
        symbol: PRIMARY.to_string(),
        magic: MAGIC,
        entry: DealEntry::Out,
        profit: -2_450.0,
        commission: -50.0,
        time: Utc::now(),
    });

    let mut engine = Engine::new(test_config(dir.path()), broker.clone())
        .await
        .unwrap();
    engine.recover().await.unwrap();

    {
        let core = engine.core().lock().await;
        assert!((core.daily.starting_balance() - 10_000.0).abs() < 1e-6);
        assert!(!core.lock.is_locked());
    }

    // An open position bleeding -700 pushes the daily total to -3200.
    // Both ticks move together so the z-score stays neutral and no entry
    // signal interferes with the breach scenario.
    let opened = broker
        .order_send(OrderRequest::market(
            PRIMARY,
            OrderAction::Buy,
            Lots::new(dec!(0.1)),
            MAGIC,
            "SPREAD:NEW",
        ))
        .await
        .unwrap();
    assert!(opened.is_done());
    broker.set_tick(PRIMARY, 2128.5, 2129.0);
    broker.set_tick(common::SECONDARY, 1064.25, 1064.35);

    engine.start().unwrap();

    // Supervisor closes everything and engages the persistent lock.
    let locked = wait_for(
        || {
            engine
                .core()
                .try_lock()
                .map(|core| core.lock.is_locked())
                .unwrap_or(false)
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(locked, "daily breach did not engage the lock");
    assert_eq!(broker.open_position_count(), 0);

    engine.shutdown().await;

    // A restart before the next session start stays locked.
    let engine = Engine::new(test_config(dir.path()), broker).await.unwrap();
    let core = engine.core().lock().await;
    assert!(core.lock.is_locked());
    assert!(core.lock.state().locked_until.is_some());
}
