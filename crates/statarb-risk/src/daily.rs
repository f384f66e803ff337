//! Daily loss tracking.
//!
//! Daily total P&L = net realized since session start (profit minus
//! commission, reconstructed from broker deal history at startup) plus
//! current unrealized P&L. The limit is a percentage of the session's
//! starting balance, itself derived as `equity − net realized`.

use chrono::NaiveTime;
use statarb_broker::{Deal, DealEntry};
use tracing::{debug, info, warn};

/// Result of loading the session's deal history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyHistorySummary {
    pub starting_balance: f64,
    pub net_realized_pnl: f64,
    pub total_commission: f64,
    pub trade_count: usize,
}

/// One cycle's daily risk figures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyRiskStatus {
    pub starting_balance: f64,
    pub net_realized_pnl: f64,
    pub total_commission: f64,
    pub unrealized_pnl: f64,
    pub daily_total_pnl: f64,
    pub daily_loss_limit: f64,
    pub daily_limit_breached: bool,
    /// Headroom left before the limit trips (negative once breached).
    pub remaining_until_daily_limit: f64,
}

/// Session-scoped P&L accumulator.
#[derive(Debug)]
pub struct DailyRiskManager {
    daily_loss_limit_pct: f64,
    session_start: NaiveTime,
    starting_balance: f64,
    net_realized_pnl: f64,
    total_commission: f64,
}

impl DailyRiskManager {
    #[must_use]
    pub fn new(daily_loss_limit_pct: f64, session_start: NaiveTime) -> Self {
        Self {
            daily_loss_limit_pct,
            session_start,
            starting_balance: 0.0,
            net_realized_pnl: 0.0,
            total_commission: 0.0,
        }
    }

    #[must_use]
    pub fn session_start(&self) -> NaiveTime {
        self.session_start
    }

    #[must_use]
    pub fn starting_balance(&self) -> f64 {
        self.starting_balance
    }

    /// Reconstruct session state from the broker's closed deals.
    ///
    /// Counts every closing deal regardless of magic, so trades placed
    /// outside the engine still consume the daily budget.
    pub fn load_daily_history(&mut self, deals: &[Deal], current_equity: f64) -> DailyHistorySummary {
        let mut total_profit = 0.0;
        let mut total_commission = 0.0;
        let mut count = 0usize;

        for deal in deals {
            if deal.entry == DealEntry::Out {
                total_profit += deal.profit;
                total_commission += deal.commission;
                count += 1;
                debug!(
                    ticket = deal.ticket,
                    symbol = %deal.symbol,
                    profit = deal.profit,
                    commission = deal.commission,
                    "Session closing deal"
                );
            }
        }

        let net_realized_pnl = total_profit - total_commission.abs();
        let starting_balance = current_equity - net_realized_pnl;

        self.starting_balance = starting_balance;
        self.net_realized_pnl = net_realized_pnl;
        self.total_commission = total_commission.abs();

        info!(
            closed_trades = count,
            total_profit,
            total_commission = self.total_commission,
            net_realized_pnl,
            starting_balance,
            "Daily history loaded"
        );
        if net_realized_pnl != 0.0 {
            warn!(
                net_realized_pnl,
                "Continuing a session with realized P&L already booked"
            );
        }

        DailyHistorySummary {
            starting_balance,
            net_realized_pnl,
            total_commission: self.total_commission,
            trade_count: count,
        }
    }

    /// Book a closed trade into the session totals.
    pub fn update_realized(&mut self, closed_profit: f64, closed_commission: f64) {
        self.net_realized_pnl += closed_profit - closed_commission.abs();
        self.total_commission += closed_commission.abs();
        debug!(
            net_realized_pnl = self.net_realized_pnl,
            total_commission = self.total_commission,
            "Realized P&L updated"
        );
    }

    /// Evaluate the daily limit against current unrealized P&L.
    #[must_use]
    pub fn check_risk(&self, unrealized_pnl: f64) -> DailyRiskStatus {
        let daily_total_pnl = self.net_realized_pnl + unrealized_pnl;
        let daily_loss_limit = self.starting_balance * self.daily_loss_limit_pct / 100.0;
        let remaining = daily_loss_limit + daily_total_pnl;

        DailyRiskStatus {
            starting_balance: self.starting_balance,
            net_realized_pnl: self.net_realized_pnl,
            total_commission: self.total_commission,
            unrealized_pnl,
            daily_total_pnl,
            daily_loss_limit,
            daily_limit_breached: daily_total_pnl < -daily_loss_limit,
            remaining_until_daily_limit: remaining,
        }
    }

    /// Reset counters for a new session.
    pub fn reset_session(&mut self) {
        self.starting_balance = 0.0;
        self.net_realized_pnl = 0.0;
        self.total_commission = 0.0;
        info!("Daily session counters reset");
    }
}
