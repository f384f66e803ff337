//! Shared fixtures for the engine integration tests.

use statarb_bot::config::{
    AppConfig, CostSection, FeatureSection, ModelSection, PairSection, RebalancerSection,
    RiskSection, SystemSection, TradingSection,
};
use statarb_broker::{BarTimeframe, SimBroker};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const PRIMARY: &str = "XAUUSD";
pub const SECONDARY: &str = "XAGUSD";
pub const MAGIC: u32 = 234000;

/// Config tuned for fast test cycles.
pub fn test_config(data_dir: &Path) -> AppConfig {
    AppConfig {
        pair: PairSection {
            primary_symbol: PRIMARY.to_string(),
            secondary_symbol: SECONDARY.to_string(),
            magic: MAGIC,
        },
        trading: TradingSection {
            entry_threshold: 2.0,
            exit_threshold: 0.5,
            scale_interval: 0.5,
            stop_loss_zscore: 3.5,
            initial_fraction: 0.33,
            max_entries: 10,
        },
        model: ModelSection {
            window_size: 50,
            window_days: 30,
            bar_timeframe: BarTimeframe::H1,
            update_interval_secs: 0.05,
        },
        risk: RiskSection::default(),
        rebalancer: RebalancerSection::default(),
        features: FeatureSection::default(),
        system: SystemSection {
            data_dir: data_dir.to_string_lossy().into_owned(),
            risk_interval_secs: 0.2,
            monitor_interval_secs: 0.2,
            attribution_interval_secs: 60.0,
            snapshot_queue_capacity: 16,
            action_queue_capacity: 16,
        },
        costs: CostSection::default(),
    }
}

/// Broker with a correlated bar history: secondary walks upward, primary
/// tracks twice the secondary plus an alternating +-10 spread, so beta is
/// about 2 and the spread std about 10.
pub fn seeded_broker() -> Arc<SimBroker> {
    let broker = Arc::new(SimBroker::with_pair(PRIMARY, SECONDARY));
    broker.set_balance(1_000_000.0);

    let count = 100;
    let duration = BarTimeframe::H1.duration();
    let now = chrono::Utc::now();
    let mut primary_bars = Vec::with_capacity(count);
    let mut secondary_bars = Vec::with_capacity(count);
    for i in 0..count {
        let s = 1000.0 + i as f64;
        let noise = if i % 2 == 0 { 10.0 } else { -10.0 };
        let p = 2.0 * s + noise;
        let time = now - duration * (count - i) as i32;
        primary_bars.push(statarb_broker::Bar {
            time,
            open: p,
            high: p,
            low: p,
            close: p,
        });
        secondary_bars.push(statarb_broker::Bar {
            time,
            open: s,
            high: s,
            low: s,
            close: s,
        });
    }
    broker.set_bars(PRIMARY, primary_bars);
    broker.set_bars(SECONDARY, secondary_bars);

    // Neutral starting ticks near the regression line.
    broker.set_tick(PRIMARY, 2198.0, 2198.5);
    broker.set_tick(SECONDARY, 1099.0, 1099.1);
    broker
}

/// Push the spread far below the mean (deep negative z, LONG entry).
pub fn set_diverged_ticks(broker: &SimBroker) {
    broker.set_tick(PRIMARY, 2153.0, 2153.5);
    broker.set_tick(SECONDARY, 1099.0, 1099.1);
}

/// Bring the spread back to the mean (z near zero, exit).
pub fn set_reverted_ticks(broker: &SimBroker) {
    broker.set_tick(PRIMARY, 2198.0, 2198.5);
    broker.set_tick(SECONDARY, 1099.0, 1099.1);
}

/// Poll until `check` returns true or the timeout elapses.
pub async fn wait_for<F: Fn() -> bool>(check: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}
