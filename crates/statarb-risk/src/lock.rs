//! Persistent trading lock.
//!
//! Engaged on a daily-limit breach, the lock survives restarts via
//! `trading_lock.json` and releases only at the next session start (or by
//! explicit operator unlock). The lock file is authoritative over any
//! in-memory "locked" flag elsewhere in the engine.

use crate::error::RiskResult;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use statarb_core::next_session_start;
use statarb_persistence::write_json_atomic;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Persisted lock state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockState {
    pub trading_locked: bool,
    pub lock_reason: String,
    pub locked_at: Option<DateTime<Utc>>,
    /// Next session-start datetime; auto-unlock fires at or after this.
    pub locked_until: Option<DateTime<Utc>>,
    pub daily_pnl_at_lock: f64,
    pub daily_limit_at_lock: f64,
    pub session_date: NaiveDate,
    pub last_updated: DateTime<Utc>,
}

impl LockState {
    fn unlocked(now: DateTime<Utc>) -> Self {
        Self {
            trading_locked: false,
            lock_reason: String::new(),
            locked_at: None,
            locked_until: None,
            daily_pnl_at_lock: 0.0,
            daily_limit_at_lock: 0.0,
            session_date: now.date_naive(),
            last_updated: now,
        }
    }
}

/// Owner of the persistent lock.
pub struct TradingLockManager {
    session_start: NaiveTime,
    path: PathBuf,
    state: LockState,
}

impl TradingLockManager {
    /// Load (or create) the lock file and apply auto-unlock immediately,
    /// so a restart after session rollover starts unlocked.
    pub fn new(state_dir: impl Into<PathBuf>, session_start: NaiveTime) -> RiskResult<Self> {
        let state_dir = state_dir.into();
        fs::create_dir_all(&state_dir).map_err(statarb_persistence::PersistenceError::Io)?;
        let path = state_dir.join("trading_lock.json");

        let now = Utc::now();
        let state = if path.exists() {
            match fs::read(&path).map(|bytes| serde_json::from_slice::<LockState>(&bytes)) {
                Ok(Ok(state)) => state,
                Ok(Err(e)) => {
                    warn!(?e, "Failed to parse lock state, starting unlocked");
                    LockState::unlocked(now)
                }
                Err(e) => {
                    warn!(?e, "Failed to read lock state, starting unlocked");
                    LockState::unlocked(now)
                }
            }
        } else {
            LockState::unlocked(now)
        };

        let mut manager = Self {
            session_start,
            path,
            state,
        };
        manager.save()?;
        manager.check_auto_unlock_at(now)?;

        if manager.is_locked() {
            warn!(
                reason = %manager.state.lock_reason,
                locked_until = ?manager.state.locked_until,
                "Trading lock is ENGAGED"
            );
        }
        Ok(manager)
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.trading_locked
    }

    #[must_use]
    pub fn state(&self) -> &LockState {
        &self.state
    }

    /// Engage the lock until the next session start.
    pub fn lock_trading(
        &mut self,
        reason: &str,
        daily_pnl: f64,
        daily_limit: f64,
    ) -> RiskResult<()> {
        self.lock_trading_at(Utc::now(), reason, daily_pnl, daily_limit)
    }

    pub fn lock_trading_at(
        &mut self,
        now: DateTime<Utc>,
        reason: &str,
        daily_pnl: f64,
        daily_limit: f64,
    ) -> RiskResult<()> {
        let locked_until = next_session_start(now, self.session_start);
        self.state = LockState {
            trading_locked: true,
            lock_reason: reason.to_string(),
            locked_at: Some(now),
            locked_until: Some(locked_until),
            daily_pnl_at_lock: daily_pnl,
            daily_limit_at_lock: daily_limit,
            session_date: now.date_naive(),
            last_updated: now,
        };
        self.save()?;

        error!(
            reason,
            daily_pnl,
            daily_limit,
            locked_until = %locked_until,
            "TRADING LOCKED until next session start"
        );
        Ok(())
    }

    /// Release the lock.
    pub fn unlock_trading(&mut self, reason: &str) -> RiskResult<()> {
        self.unlock_trading_at(Utc::now(), reason)
    }

    pub fn unlock_trading_at(&mut self, now: DateTime<Utc>, reason: &str) -> RiskResult<()> {
        self.state = LockState::unlocked(now);
        self.save()?;
        info!(reason, "Trading unlocked");
        Ok(())
    }

    /// Release the lock if the session has rolled over.
    pub fn check_auto_unlock(&mut self) -> RiskResult<()> {
        self.check_auto_unlock_at(Utc::now())
    }

    pub fn check_auto_unlock_at(&mut self, now: DateTime<Utc>) -> RiskResult<()> {
        if !self.state.trading_locked {
            return Ok(());
        }

        if let Some(locked_until) = self.state.locked_until {
            if now >= locked_until {
                info!(locked_until = %locked_until, "Auto-unlock: session start reached");
                return self.unlock_trading_at(now, "New session started - auto-unlock");
            }
        }

        // Backup check on the session date.
        if now.date_naive() != self.state.session_date {
            info!(date = %now.date_naive(), "Auto-unlock: new session date");
            return self.unlock_trading_at(now, "New session date - auto-unlock");
        }
        Ok(())
    }

    fn save(&self) -> RiskResult<()> {
        write_json_atomic(&self.path, &self.state)?;
        Ok(())
    }
}
