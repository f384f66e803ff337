//! Market-data collection: bootstrap once, then tick.
//!
//! `MarketData` owns the rolling window. `bootstrap` fills it with
//! historical bars; `snapshot` overwrites the current bar's close with the
//! latest bid, recomputing statistics without reallocating the window, and
//! rolls forward when the bar clock advances.

use crate::error::{MarketError, MarketResult};
use crate::window::RollingWindow;
use chrono::{DateTime, TimeZone, Utc};
use statarb_broker::{BarTimeframe, DynBroker};
use statarb_core::{Lots, MarketSnapshot, SymbolSpec};
use tracing::{debug, info};

/// Split a primary volume into hedged leg volumes.
///
/// The hedge uses the same sign convention as the rebalancer's imbalance:
/// `imbalance = primary − β × secondary`, so a clean hedge holds
/// `secondary = primary / β` lots.
pub fn hedge_quantities(
    primary_lots: f64,
    hedge_ratio: f64,
    primary_spec: &SymbolSpec,
    secondary_spec: &SymbolSpec,
) -> MarketResult<(Lots, Lots)> {
    if hedge_ratio.abs() < 1e-6 {
        return Err(MarketError::DegenerateHedgeRatio(hedge_ratio));
    }
    let primary = primary_spec.normalize_lots(Lots::from_f64(primary_lots));
    let secondary = secondary_spec.normalize_lots(Lots::from_f64(primary_lots / hedge_ratio));
    Ok((primary, secondary))
}

/// Floor a timestamp onto the bar grid.
fn bar_open_time(now: DateTime<Utc>, timeframe: BarTimeframe) -> DateTime<Utc> {
    let step = timeframe.duration().num_seconds();
    let secs = now.timestamp();
    Utc.timestamp_opt(secs - secs.rem_euclid(step), 0)
        .single()
        .unwrap_or(now)
}

/// Rolling statistics pipeline for one configured pair.
pub struct MarketData {
    broker: DynBroker,
    primary_symbol: String,
    secondary_symbol: String,
    timeframe: BarTimeframe,
    window: RollingWindow,
    current_bar: Option<DateTime<Utc>>,
}

impl MarketData {
    #[must_use]
    pub fn new(
        broker: DynBroker,
        primary_symbol: &str,
        secondary_symbol: &str,
        timeframe: BarTimeframe,
        window_size: usize,
    ) -> Self {
        Self {
            broker,
            primary_symbol: primary_symbol.to_string(),
            secondary_symbol: secondary_symbol.to_string(),
            timeframe,
            window: RollingWindow::new(window_size),
            current_bar: None,
        }
    }

    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window.capacity()
    }

    /// Populate the window from broker history.
    ///
    /// Requests `window_days` worth of bars and keeps the last W of each
    /// leg; fails when either leg has fewer than W bars.
    pub async fn bootstrap(&mut self, window_days: u32) -> MarketResult<()> {
        let required = self.window.capacity();
        let request = (window_days as usize)
            .saturating_mul(self.timeframe.bars_per_day())
            .max(required);

        let primary_bars = self
            .broker
            .bars(&self.primary_symbol, self.timeframe, request)
            .await?;
        let secondary_bars = self
            .broker
            .bars(&self.secondary_symbol, self.timeframe, request)
            .await?;

        for (symbol, bars) in [
            (&self.primary_symbol, &primary_bars),
            (&self.secondary_symbol, &secondary_bars),
        ] {
            if bars.len() < required {
                return Err(MarketError::InsufficientHistory {
                    symbol: symbol.clone(),
                    available: bars.len(),
                    required,
                });
            }
        }

        let p_tail = &primary_bars[primary_bars.len() - required..];
        let s_tail = &secondary_bars[secondary_bars.len() - required..];
        for (p, s) in p_tail.iter().zip(s_tail.iter()) {
            self.window.push(p.close, s.close);
        }
        self.current_bar = p_tail.last().map(|b| bar_open_time(b.time, self.timeframe));

        info!(
            window = required,
            timeframe = ?self.timeframe,
            "Rolling window bootstrapped"
        );
        Ok(())
    }

    /// Produce a snapshot from the latest ticks.
    ///
    /// The tail bar's close becomes the latest bid; when the wall clock has
    /// moved to a new bar the window rolls forward first.
    pub async fn snapshot(&mut self) -> MarketResult<MarketSnapshot> {
        if self.window.is_empty() {
            return Err(MarketError::NotBootstrapped);
        }

        let primary_tick = self.broker.symbol_tick(&self.primary_symbol).await?;
        let secondary_tick = self.broker.symbol_tick(&self.secondary_symbol).await?;

        let now = Utc::now();
        let bar = bar_open_time(now, self.timeframe);
        let primary_close = primary_tick.bid.to_f64();
        let secondary_close = secondary_tick.bid.to_f64();

        match self.current_bar {
            Some(current) if bar > current => {
                self.window.push(primary_close, secondary_close);
                self.current_bar = Some(bar);
                debug!(bar = %bar, "Rolled window forward");
            }
            _ => {
                self.window.update_tail(primary_close, secondary_close);
                if self.current_bar.is_none() {
                    self.current_bar = Some(bar);
                }
            }
        }

        let stats = self.window.stats().ok_or(MarketError::NotBootstrapped)?;

        Ok(MarketSnapshot {
            timestamp: now,
            primary_bid: primary_tick.bid.to_f64(),
            primary_ask: primary_tick.ask.to_f64(),
            secondary_bid: secondary_tick.bid.to_f64(),
            secondary_ask: secondary_tick.ask.to_f64(),
            spread: stats.spread,
            spread_mean: stats.spread_mean,
            spread_std: stats.spread_std,
            zscore: stats.zscore,
            hedge_ratio: stats.hedge_ratio,
        })
    }
}
