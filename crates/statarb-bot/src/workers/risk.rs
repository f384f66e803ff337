//! Risk supervisor loop.
//!
//! Runs independently of the trading pipeline and pulls account state
//! directly from the broker, so a stalled signal worker cannot disable
//! safety. Three orthogonal limits, each with a one-shot trigger flag that
//! re-arms when the metric recovers to 80% of the limit:
//!
//! 1. per-setup loss -> close-all under the tag (the close helper cannot
//!    target a subset; the limitation is logged at breach time)
//! 2. total unrealized loss -> emergency close-all
//! 3. daily total loss -> close-all plus the persistent trading lock
//!
//! Also detects manual closures via its own ticket set, auto-resets
//! orphaned grid states, and raises throttled margin/drawdown alerts.

use super::{full_internal_cleanup, Shared};
use statarb_core::{AlertSeverity, SpreadId};
use statarb_executor::CloseManager;
use statarb_risk::{config::RECOVERY_FRACTION, AlertThrottle};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{error, info, warn};

/// Consecutive broker failures before the connection is called lost.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// More open positions than this means a runaway bot.
const MAX_REASONABLE_POSITIONS: usize = 50;

pub struct RiskWorker {
    shared: Shared,
    closer: CloseManager,
    interval: Duration,
    throttle: AlertThrottle,
    consecutive_failures: u32,
    portfolio_triggered: bool,
    daily_triggered: bool,
    setups_triggered: HashSet<SpreadId>,
    current_session: Option<chrono::DateTime<chrono::Utc>>,
}

impl RiskWorker {
    pub fn new(shared: Shared, interval_secs: f64) -> Self {
        let closer = CloseManager::new(shared.broker.clone(), shared.magic);
        Self {
            shared,
            closer,
            interval: Duration::from_secs_f64(interval_secs),
            throttle: AlertThrottle::default_cooldown(),
            consecutive_failures: 0,
            portfolio_triggered: false,
            daily_triggered: false,
            setups_triggered: HashSet::new(),
            current_session: None,
        }
    }

    pub async fn run(mut self) {
        info!("Risk supervisor started (independent of the trading pipeline)");

        while self.shared.is_running() {
            tokio::time::sleep(self.interval).await;
            if !self.shared.is_running() {
                break;
            }
            self.cycle().await;
        }

        info!("Risk supervisor stopped");
    }

    async fn cycle(&mut self) {
        let account = match self.shared.broker.account_info().await {
            Ok(account) => {
                self.consecutive_failures = 0;
                account
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    error!(
                        cycles = self.consecutive_failures,
                        error = %e,
                        "Broker connection lost; cannot enforce limits"
                    );
                }
                return;
            }
        };

        let positions = match self.shared.broker.positions(Some(self.shared.magic)).await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "Failed to list positions");
                return;
            }
        };

        self.roll_session_if_needed(account.equity).await;

        let balance = account.balance;
        let unrealized = account.equity - account.balance;
        let position_count = positions.len();
        let ticket_profit: HashMap<u64, f64> =
            positions.iter().map(|p| (p.ticket, p.profit)).collect();
        let live_tickets: HashSet<u64> = positions.iter().map(|p| p.ticket).collect();

        self.check_portfolio_limit(balance, unrealized).await;
        self.check_daily_limit(unrealized).await;
        self.check_setup_limits(balance, &ticket_profit).await;
        self.check_margin(&account);
        self.check_drawdown().await;
        self.check_manual_closure(&live_tickets).await;
        self.auto_reset_orphan_states(position_count).await;

        if position_count > MAX_REASONABLE_POSITIONS
            && self.throttle.should_alert("excessive_positions")
        {
            error!(position_count, "Excessive open positions, possible runaway");
            self.shared.alerts.emit(
                AlertSeverity::Critical,
                "Excessive positions",
                format!("{position_count} open positions under the strategy tag"),
            );
        }
    }

    /// Reset daily counters when the clock crosses the session start.
    async fn roll_session_if_needed(&mut self, equity: f64) {
        let session_start = self.shared.risk_config.read().session_start;
        let session = statarb_core::session_start_at(chrono::Utc::now(), session_start);
        match self.current_session {
            None => self.current_session = Some(session),
            Some(current) if session > current => {
                info!(session = %session, "Session rollover, resetting daily counters");
                self.current_session = Some(session);
                self.daily_triggered = false;
                let mut core = self.shared.core.lock().await;
                core.daily.reset_session();
                // New session starts from current equity with no history.
                core.daily.load_daily_history(&[], equity);
            }
            Some(_) => {}
        }
    }

    /// Layer 2: total unrealized loss across all positions.
    async fn check_portfolio_limit(&mut self, balance: f64, unrealized: f64) {
        let limit = self.shared.risk_config.read().total_portfolio_limit(balance);

        if unrealized < -limit && !self.portfolio_triggered {
            error!(
                unrealized,
                limit, "TOTAL PORTFOLIO RISK BREACH, closing all positions"
            );
            self.shared.alerts.emit(
                AlertSeverity::Critical,
                "Portfolio Risk Breach",
                format!("unrealized {unrealized:.2} below portfolio limit -{limit:.2}"),
            );
            self.portfolio_triggered = true;
            self.emergency_flatten("Portfolio risk breach").await;
        } else if unrealized >= -limit * RECOVERY_FRACTION {
            self.portfolio_triggered = false;
        }
    }

    /// Layer 3: daily total loss; breach also engages the persistent lock.
    async fn check_daily_limit(&mut self, unrealized: f64) {
        let status = {
            let core = self.shared.core.lock().await;
            core.daily.check_risk(unrealized)
        };

        if status.daily_limit_breached && !self.daily_triggered {
            error!(
                daily_total = status.daily_total_pnl,
                limit = status.daily_loss_limit,
                "DAILY LOSS LIMIT BREACHED, closing all and locking trading"
            );
            self.shared.alerts.emit(
                AlertSeverity::Critical,
                "Daily Limit Breach",
                format!(
                    "daily total {:.2} below limit -{:.2}; trading locked until next session",
                    status.daily_total_pnl, status.daily_loss_limit
                ),
            );
            self.daily_triggered = true;

            let report = self.closer.close_all().await;
            if let Err(e) = report {
                error!(error = %e, "Emergency close failed, manual intervention required");
            }

            let mut core = self.shared.core.lock().await;
            let reason = format!(
                "Daily loss limit breached: {:.2}",
                status.daily_total_pnl
            );
            if let Err(e) =
                core.lock
                    .lock_trading(&reason, status.daily_total_pnl, status.daily_loss_limit)
            {
                error!(error = %e, "Failed to persist trading lock");
            }
            full_internal_cleanup(&mut core, &self.shared, &reason);
        } else if status.daily_total_pnl >= -status.daily_loss_limit * RECOVERY_FRACTION {
            self.daily_triggered = false;
        }
    }

    /// Layer 1: per-setup realized+unrealized loss.
    async fn check_setup_limits(&mut self, balance: f64, ticket_profit: &HashMap<u64, f64>) {
        let limit = self.shared.risk_config.read().per_setup_limit(balance);

        let spread_pnls: HashMap<SpreadId, f64> = {
            let core = self.shared.core.lock().await;
            let mut pnls = core.registry.spread_pnls();
            // Refresh with the broker's live numbers from this cycle.
            for (spread_id, pnl) in pnls.iter_mut() {
                let live: f64 = core
                    .registry
                    .legs()
                    .filter(|l| &l.spread_id == spread_id)
                    .filter_map(|l| ticket_profit.get(&l.ticket))
                    .sum();
                let cached: f64 = core
                    .registry
                    .legs()
                    .filter(|l| &l.spread_id == spread_id)
                    .map(|l| l.unrealized_pnl)
                    .sum();
                *pnl += live - cached;
            }
            pnls
        };

        for (spread_id, pnl) in spread_pnls {
            if pnl < -limit && !self.setups_triggered.contains(&spread_id) {
                error!(
                    spread_id = %spread_id.prefix(),
                    pnl,
                    limit,
                    "SETUP RISK BREACH"
                );
                // The close helper cannot target one spread's tickets, so
                // the whole account under the tag goes flat.
                warn!("Closing ALL positions under the tag (no per-spread close available)");
                self.shared.alerts.emit(
                    AlertSeverity::Critical,
                    "Setup Risk Breach",
                    format!(
                        "setup {} P&L {pnl:.2} below per-setup limit -{limit:.2}; closing all",
                        spread_id.prefix()
                    ),
                );
                self.setups_triggered.insert(spread_id);
                self.emergency_flatten("Setup risk breach").await;
            } else if pnl >= -limit * RECOVERY_FRACTION {
                self.setups_triggered.remove(&spread_id);
            }
        }
    }

    fn check_margin(&mut self, account: &statarb_broker::AccountInfo) {
        let level = account.margin_level;
        if level <= 0.0 {
            return;
        }
        if level < 150.0 {
            error!(margin_level = level, "CRITICAL margin level");
            if self.throttle.should_alert("margin_critical") {
                self.shared.alerts.emit(
                    AlertSeverity::Critical,
                    "Low Margin",
                    format!(
                        "margin level {level:.2}% (equity {:.2}, free {:.2})",
                        account.equity, account.margin_free
                    ),
                );
            }
        } else if level < 200.0 {
            warn!(margin_level = level, "Low margin level");
        }
    }

    async fn check_drawdown(&mut self) {
        let metrics = {
            let core = self.shared.core.lock().await;
            core.drawdown.metrics()
        };
        if metrics.current_drawdown_pct > 0.15 {
            error!(drawdown = metrics.current_drawdown_pct, "CRITICAL drawdown");
            if self.throttle.should_alert("drawdown_critical") {
                self.shared.alerts.emit(
                    AlertSeverity::Critical,
                    "Critical Drawdown",
                    format!("drawdown {:.2}% from peak", metrics.current_drawdown_pct * 100.0),
                );
            }
        } else if metrics.current_drawdown_pct > 0.10 {
            warn!(drawdown = metrics.current_drawdown_pct, "High drawdown");
        }
    }

    /// Tickets we watch that vanished from the broker were closed outside
    /// the engine (operator, stop-out, broker force close).
    async fn check_manual_closure(&mut self, live_tickets: &HashSet<u64>) {
        if self.shared.risk_watch.is_empty() {
            return;
        }
        let missing = self.shared.risk_watch.missing_from(live_tickets);
        if missing.is_empty() {
            return;
        }

        if missing.len() == self.shared.risk_watch.len() {
            warn!(
                missing = ?missing,
                "MANUAL CLOSURE DETECTED: every watched position is gone"
            );
            self.shared.alerts.emit(
                AlertSeverity::Warning,
                "Manual closure",
                format!("{} watched positions closed outside the engine", missing.len()),
            );
            let mut core = self.shared.core.lock().await;
            full_internal_cleanup(&mut core, &self.shared, "Manual closure detected");
        } else {
            warn!(missing = ?missing, "Partial manual closure");
            for ticket in missing {
                self.shared.risk_watch.unregister(ticket);
            }
        }
    }

    /// Grid states with no broker positions behind them are stale; clear
    /// them so fresh entries are possible.
    async fn auto_reset_orphan_states(&mut self, position_count: usize) {
        if position_count > 0 {
            return;
        }
        let mut core = self.shared.core.lock().await;
        if core.unified.has_states() {
            info!("Auto-reset: no broker positions but grid states exist");
            if let Err(e) = core.unified.reset_all() {
                error!(error = %e, "Failed to reset grid states");
            }
        }
    }

    async fn emergency_flatten(&mut self, reason: &str) {
        match self.closer.close_all().await {
            Ok(report) => {
                info!(
                    closed = report.total_closed,
                    failed = report.total_failed,
                    "Emergency close result"
                );
            }
            Err(e) => {
                error!(error = %e, "EMERGENCY CLOSE FAILED, manual intervention required");
            }
        }
        let mut core = self.shared.core.lock().await;
        full_internal_cleanup(&mut core, &self.shared, reason);
    }
}
