//! Engine wiring.
//!
//! `TradingCore` is the single shared mutable state (grid executor,
//! registry, attribution, rebalancer, lock, daily risk) behind one async
//! mutex; contention is negligible at the workers' cadences. `Engine`
//! owns the broker handle, the queues, and the worker tasks, and exposes
//! the operator command surface (close-all, config updates, shutdown).

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::recovery;
use crate::workers::{self, Shared};
use parking_lot::RwLock;
use statarb_attribution::AttributionEngine;
use statarb_broker::DynBroker;
use statarb_core::{
    session_start_at, ActionQueue, AlertBus, MarketSnapshot, SymbolSpec,
};
use statarb_executor::{
    CloseManager, CloseReport, TradeExecutor, UnifiedExecutor, VolumeRebalancer,
};
use statarb_market::MarketData;
use statarb_persistence::{PositionStore, SetupFlagManager, SpreadStateFile};
use statarb_position::{PositionRegistry, TicketWatch};
use statarb_risk::{DailyRiskManager, DrawdownMonitor, RiskConfig, TradingLockManager};
use statarb_signal::SignalGenerator;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Runtime-togglable feature switches.
#[derive(Debug)]
pub struct Features {
    pub volume_rebalancing: AtomicBool,
    pub attribution_kill_switch: AtomicBool,
}

/// Everything the workers mutate under the coarse mutex.
pub struct TradingCore {
    pub unified: UnifiedExecutor,
    pub registry: PositionRegistry,
    pub attribution: AttributionEngine,
    pub rebalancer: VolumeRebalancer,
    pub signal_generator: SignalGenerator,
    pub lock: TradingLockManager,
    pub daily: DailyRiskManager,
    pub drawdown: DrawdownMonitor,
    pub account_balance: f64,
    pub current_snapshot: Option<MarketSnapshot>,
}

/// The assembled engine.
pub struct Engine {
    config: AppConfig,
    broker: DynBroker,
    core: Arc<Mutex<TradingCore>>,
    running: Arc<AtomicBool>,
    actions: Arc<ActionQueue>,
    alerts: AlertBus,
    monitor_watch: TicketWatch,
    risk_watch: TicketWatch,
    store: Arc<PositionStore>,
    flag: Arc<SetupFlagManager>,
    risk_config: Arc<RwLock<RiskConfig>>,
    features: Arc<Features>,
    primary_spec: SymbolSpec,
    secondary_spec: SymbolSpec,
    snapshot_tx: mpsc::Sender<MarketSnapshot>,
    snapshot_rx: Option<mpsc::Receiver<MarketSnapshot>>,
    market: Option<MarketData>,
    workers: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Assemble the engine: fetch symbol specs, open the state files, load
    /// the lock, and reconstruct the session's daily history.
    pub async fn new(config: AppConfig, broker: DynBroker) -> AppResult<Self> {
        config.validate()?;
        broker.initialize().await?;

        let primary_spec = broker.symbol_info(&config.pair.primary_symbol).await?;
        let secondary_spec = broker.symbol_info(&config.pair.secondary_symbol).await?;
        info!(
            primary = %primary_spec.symbol,
            secondary = %secondary_spec.symbol,
            magic = config.pair.magic,
            "Pair specs loaded"
        );

        let data_dir = PathBuf::from(&config.system.data_dir);
        let store = Arc::new(PositionStore::new(data_dir.join("positions"))?);
        let flag = Arc::new(SetupFlagManager::new(data_dir.join("asset"))?);
        let state_dir = data_dir.join("asset").join("state");
        let state_file = SpreadStateFile::new(&state_dir)?;

        let risk_config = config.risk_config()?;
        let lock = TradingLockManager::new(&state_dir, risk_config.session_start)?;

        let monitor_watch = TicketWatch::new();
        let risk_watch = TicketWatch::new();

        let trade = TradeExecutor::new(
            broker.clone(),
            config.pair.magic,
            primary_spec.clone(),
            secondary_spec.clone(),
        );
        let mut unified = UnifiedExecutor::new(
            trade,
            config.unified_config(),
            state_file,
            store.clone(),
            flag.clone(),
            monitor_watch.clone(),
            risk_watch.clone(),
        );

        // Reconstruct the session's realized P&L from broker deal history,
        // so a mid-session restart keeps the daily limit honest.
        let mut daily = DailyRiskManager::new(
            risk_config.daily_loss_limit_pct,
            risk_config.session_start,
        );
        let account = broker.account_info().await?;
        let now = chrono::Utc::now();
        let session_start = session_start_at(now, risk_config.session_start);
        let deals = broker.history_deals(session_start, now).await?;
        daily.load_daily_history(&deals, account.equity);
        unified.update_balance(account.balance);

        let market = MarketData::new(
            broker.clone(),
            &config.pair.primary_symbol,
            &config.pair.secondary_symbol,
            config.model.bar_timeframe,
            config.model.window_size,
        );

        let (snapshot_tx, snapshot_rx) = mpsc::channel(config.system.snapshot_queue_capacity);
        let actions = Arc::new(ActionQueue::new(config.system.action_queue_capacity));

        let core = TradingCore {
            unified,
            registry: PositionRegistry::new(),
            attribution: AttributionEngine::new(config.costs.commission_per_lot),
            rebalancer: VolumeRebalancer::new(config.rebalancer_config()),
            signal_generator: SignalGenerator::new(config.signal_config()?),
            lock,
            daily,
            drawdown: DrawdownMonitor::new(),
            account_balance: account.balance,
            current_snapshot: None,
        };

        let features = Arc::new(Features {
            volume_rebalancing: AtomicBool::new(config.features.volume_rebalancing),
            attribution_kill_switch: AtomicBool::new(config.features.attribution_kill_switch),
        });

        Ok(Self {
            broker,
            core: Arc::new(Mutex::new(core)),
            running: Arc::new(AtomicBool::new(false)),
            actions,
            alerts: AlertBus::default(),
            monitor_watch,
            risk_watch,
            store,
            flag,
            risk_config: Arc::new(RwLock::new(risk_config)),
            features,
            primary_spec,
            secondary_spec,
            snapshot_tx,
            snapshot_rx: Some(snapshot_rx),
            market: Some(market),
            workers: Vec::new(),
            config,
        })
    }

    fn shared(&self) -> Shared {
        Shared {
            broker: self.broker.clone(),
            core: self.core.clone(),
            running: self.running.clone(),
            actions: self.actions.clone(),
            alerts: self.alerts.clone(),
            monitor_watch: self.monitor_watch.clone(),
            risk_watch: self.risk_watch.clone(),
            store: self.store.clone(),
            flag: self.flag.clone(),
            risk_config: self.risk_config.clone(),
            features: self.features.clone(),
            magic: self.config.pair.magic,
            primary_spec: self.primary_spec.clone(),
            secondary_spec: self.secondary_spec.clone(),
        }
    }

    /// Reconcile on-disk intent against live broker positions. Must run
    /// before `start`.
    pub async fn recover(&self) -> AppResult<()> {
        let mut core = self.core.lock().await;
        recovery::run_recovery(
            &self.broker,
            &mut core,
            &self.store,
            &self.flag,
            &self.monitor_watch,
            &self.risk_watch,
            self.config.pair.magic,
            self.config.trading.scale_interval,
            &PathBuf::from(&self.config.system.data_dir)
                .join("asset")
                .join("state"),
        )
        .await
    }

    /// Spawn the worker loops. Risk supervision starts before the trading
    /// pipeline so safety is live first.
    pub fn start(&mut self) -> AppResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Engine already running");
            return Ok(());
        }
        let shared = self.shared();

        let snapshot_rx = self
            .snapshot_rx
            .take()
            .ok_or_else(|| AppError::Config("engine already started once".to_string()))?;
        let market = self
            .market
            .take()
            .ok_or_else(|| AppError::Config("engine already started once".to_string()))?;

        self.workers.push(tokio::spawn(
            workers::risk::RiskWorker::new(shared.clone(), self.config.system.risk_interval_secs)
                .run(),
        ));
        self.workers.push(tokio::spawn(
            workers::collector::CollectorWorker::new(
                shared.clone(),
                market,
                self.snapshot_tx.clone(),
                self.config.model.update_interval_secs,
                self.config.model.window_days,
            )
            .run(),
        ));
        self.workers.push(tokio::spawn(
            workers::signal::SignalWorker::new(shared.clone(), snapshot_rx).run(),
        ));
        self.workers.push(tokio::spawn(
            workers::execution::ExecutionWorker::new(shared.clone()).run(),
        ));
        self.workers.push(tokio::spawn(
            workers::monitor::MonitorWorker::new(
                shared.clone(),
                self.config.system.monitor_interval_secs,
            )
            .run(),
        ));
        self.workers.push(tokio::spawn(
            workers::attribution::AttributionWorker::new(
                shared,
                self.config.system.attribution_interval_secs,
            )
            .run(),
        ));

        info!("Engine started ({} workers)", self.workers.len());
        Ok(())
    }

    /// Cooperative stop: flip the flag and drain the workers.
    pub async fn shutdown(&mut self) {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
        info!("Engine stopped");
    }

    /// Signal the workers to stop without waiting.
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn alerts(&self) -> &AlertBus {
        &self.alerts
    }

    #[must_use]
    pub fn core(&self) -> &Arc<Mutex<TradingCore>> {
        &self.core
    }

    // === Operator command surface ===

    /// Close everything under the strategy tag and reset internal state.
    pub async fn close_all(&self) -> AppResult<CloseReport> {
        let closer = CloseManager::new(self.broker.clone(), self.config.pair.magic);
        let report = closer.close_all().await?;

        let shared = self.shared();
        let mut core = self.core.lock().await;
        workers::full_internal_cleanup(&mut core, &shared, "Operator close-all");
        Ok(report)
    }

    pub async fn update_scale_interval(&self, scale_interval: f64) -> AppResult<()> {
        let mut core = self.core.lock().await;
        core.unified.update_scale_interval(scale_interval)?;
        Ok(())
    }

    pub async fn update_entry_threshold(&self, entry_threshold: f64) {
        let mut core = self.core.lock().await;
        core.signal_generator.set_entry_threshold(entry_threshold);
        info!(entry_threshold, "Entry threshold updated");
    }

    pub async fn update_exit_threshold(&self, exit_threshold: f64) {
        let mut core = self.core.lock().await;
        core.signal_generator.set_exit_threshold(exit_threshold);
        info!(exit_threshold, "Exit threshold updated");
    }

    pub async fn update_stop_loss_zscore(&self, max_zscore: f64) {
        let mut core = self.core.lock().await;
        core.unified.set_max_zscore(max_zscore);
        info!(max_zscore, "Stop-loss z-score updated");
    }

    pub fn update_risk_limits(
        &self,
        max_loss_per_setup_pct: f64,
        max_total_unrealized_loss_pct: f64,
        daily_loss_limit_pct: f64,
    ) {
        let mut config = self.risk_config.write();
        config.max_loss_per_setup_pct = max_loss_per_setup_pct;
        config.max_total_unrealized_loss_pct = max_total_unrealized_loss_pct;
        config.daily_loss_limit_pct = daily_loss_limit_pct;
        info!(
            max_loss_per_setup_pct,
            max_total_unrealized_loss_pct, daily_loss_limit_pct, "Risk limits updated"
        );
    }

    pub fn set_volume_rebalancing(&self, enabled: bool) {
        self.features.volume_rebalancing.store(enabled, Ordering::SeqCst);
        info!(enabled, "Volume rebalancing toggled");
    }

    pub fn set_attribution_kill_switch(&self, enabled: bool) {
        self.features
            .attribution_kill_switch
            .store(enabled, Ordering::SeqCst);
        info!(enabled, "Attribution kill-switch toggled");
    }
}
