//! Worker loops.
//!
//! Five long-lived tasks plus attribution, all cooperating through the
//! shared trading core and the two queues. Each loop polls the running
//! flag between iterations and drains its current iteration on shutdown.

pub mod attribution;
pub mod collector;
pub mod execution;
pub mod monitor;
pub mod risk;
pub mod signal;

use crate::app::{Features, TradingCore};
use parking_lot::RwLock;
use statarb_broker::DynBroker;
use statarb_core::{ActionQueue, AlertBus, SymbolSpec};
use statarb_persistence::{PositionStore, SetupFlagManager};
use statarb_position::TicketWatch;
use statarb_risk::RiskConfig;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Handles shared by every worker.
#[derive(Clone)]
pub struct Shared {
    pub broker: DynBroker,
    pub core: Arc<Mutex<TradingCore>>,
    pub running: Arc<AtomicBool>,
    pub actions: Arc<ActionQueue>,
    pub alerts: AlertBus,
    pub monitor_watch: TicketWatch,
    pub risk_watch: TicketWatch,
    pub store: Arc<PositionStore>,
    pub flag: Arc<SetupFlagManager>,
    pub risk_config: Arc<RwLock<RiskConfig>>,
    pub features: Arc<Features>,
    pub magic: u32,
    pub primary_spec: SymbolSpec,
    pub secondary_spec: SymbolSpec,
}

impl Shared {
    pub fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Wipe every internal tracking structure after the book went flat
/// (emergency close, manual closure, operator close-all).
pub fn full_internal_cleanup(core: &mut TradingCore, shared: &Shared, reason: &str) {
    info!(reason, "Cleaning up internal tracking");

    core.registry.clear();
    core.rebalancer.clear();
    core.attribution.clear();
    if let Err(e) = core.unified.reset_all() {
        error!(error = %e, "Failed to persist grid-state reset");
    }
    if let Err(e) = shared.store.clear_all() {
        error!(error = %e, "Failed to clear persisted positions");
    }
    if let Err(e) = shared.flag.mark_setup_inactive(reason) {
        error!(error = %e, "Failed to deactivate setup flag");
    }
    shared.monitor_watch.clear();
    shared.risk_watch.clear();

    info!("Internal tracking cleanup complete");
}
