//! True rolling window over the pair's close prices.
//!
//! The tail bar is updated in place on every tick until the bar closes,
//! then the window rolls forward by one. Statistics are recomputed from the
//! full window on every update; at the default hourly frequency and window
//! sizes in the hundreds this costs nothing measurable.

use statarb_core::ZSCORE_STD_EPSILON;
use std::collections::VecDeque;

/// Spread statistics over one window state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpreadStats {
    /// Regression beta of primary on secondary: cov(s, p) / var(s).
    pub hedge_ratio: f64,
    /// Spread of the latest (tail) bar: `primary − β × secondary`.
    pub spread: f64,
    pub spread_mean: f64,
    /// Sample (n−1) standard deviation.
    pub spread_std: f64,
    /// `(spread − mean) / std`, 0 when std is below epsilon.
    pub zscore: f64,
}

/// Fixed-capacity window of paired closes.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    primary: VecDeque<f64>,
    secondary: VecDeque<f64>,
}

impl RollingWindow {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            primary: VecDeque::with_capacity(capacity),
            secondary: VecDeque::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.primary.len() == self.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Roll the window forward by one bar.
    pub fn push(&mut self, primary_close: f64, secondary_close: f64) {
        if self.primary.len() == self.capacity {
            self.primary.pop_front();
            self.secondary.pop_front();
        }
        self.primary.push_back(primary_close);
        self.secondary.push_back(secondary_close);
    }

    /// Overwrite the tail bar with the latest prices.
    ///
    /// No-op on an empty window.
    pub fn update_tail(&mut self, primary_close: f64, secondary_close: f64) {
        if let (Some(p), Some(s)) = (self.primary.back_mut(), self.secondary.back_mut()) {
            *p = primary_close;
            *s = secondary_close;
        }
    }

    /// Compute spread statistics over the current window.
    ///
    /// Returns `None` until at least two bars are present.
    #[must_use]
    pub fn stats(&self) -> Option<SpreadStats> {
        let n = self.primary.len();
        if n < 2 {
            return None;
        }
        let nf = n as f64;

        let p_mean = self.primary.iter().sum::<f64>() / nf;
        let s_mean = self.secondary.iter().sum::<f64>() / nf;

        let mut cov = 0.0;
        let mut var_s = 0.0;
        for (p, s) in self.primary.iter().zip(self.secondary.iter()) {
            cov += (s - s_mean) * (p - p_mean);
            var_s += (s - s_mean) * (s - s_mean);
        }

        // Flat secondary leg: no regression is possible, fall back to a
        // pure price-difference spread.
        let hedge_ratio = if var_s.abs() < f64::EPSILON {
            0.0
        } else {
            cov / var_s
        };

        let spreads: Vec<f64> = self
            .primary
            .iter()
            .zip(self.secondary.iter())
            .map(|(p, s)| p - hedge_ratio * s)
            .collect();

        let spread_mean = spreads.iter().sum::<f64>() / nf;
        let ss: f64 = spreads.iter().map(|x| (x - spread_mean).powi(2)).sum();
        let spread_std = (ss / (nf - 1.0)).sqrt();

        let spread = *spreads.last()?;
        let zscore = if spread_std < ZSCORE_STD_EPSILON {
            0.0
        } else {
            (spread - spread_mean) / spread_std
        };

        Some(SpreadStats {
            hedge_ratio,
            spread,
            spread_mean,
            spread_std,
            zscore,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_window() -> RollingWindow {
        let mut window = RollingWindow::new(8);
        for (p, s) in [(2.0, 1.0), (4.0, 2.0), (6.0, 3.0), (9.0, 4.0)] {
            window.push(p, s);
        }
        window
    }

    #[test]
    fn test_regression_beta_and_zscore() {
        let stats = filled_window().stats().unwrap();

        // By hand: beta = 11.5 / 5 = 2.3, spreads = [-0.3, -0.6, -0.9, -0.2],
        // mean = -0.5, sample std = sqrt(0.1).
        assert!((stats.hedge_ratio - 2.3).abs() < 1e-12);
        assert!((stats.spread_mean + 0.5).abs() < 1e-12);
        assert!((stats.spread_std - 0.1f64.sqrt()).abs() < 1e-12);
        assert!((stats.zscore - 0.3 / 0.1f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_flat_spread_zscore_is_zero() {
        let mut window = RollingWindow::new(8);
        for s in [1.0, 2.0, 3.0, 4.0] {
            window.push(2.0 * s, s);
        }
        let stats = window.stats().unwrap();
        assert!((stats.hedge_ratio - 2.0).abs() < 1e-12);
        assert!(stats.spread_std < 1e-12);
        assert_eq!(stats.zscore, 0.0);
    }

    #[test]
    fn test_update_tail_changes_stats_in_place() {
        let mut window = filled_window();
        let before = window.stats().unwrap();

        window.update_tail(12.0, 4.0);
        let after = window.stats().unwrap();

        assert_eq!(window.len(), 4);
        assert_ne!(before.spread, after.spread);

        // Restoring the tail restores the stats.
        window.update_tail(9.0, 4.0);
        let restored = window.stats().unwrap();
        assert!((restored.spread - before.spread).abs() < 1e-12);
    }

    #[test]
    fn test_push_evicts_oldest_at_capacity() {
        let mut window = RollingWindow::new(3);
        for i in 0..5 {
            window.push(i as f64, i as f64);
        }
        assert_eq!(window.len(), 3);
        assert!(window.is_full());

        // Oldest survivors are bars 2..=4.
        let stats = window.stats().unwrap();
        assert!((stats.hedge_ratio - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_bars() {
        let mut window = RollingWindow::new(4);
        assert!(window.stats().is_none());
        window.push(1.0, 1.0);
        assert!(window.stats().is_none());
    }

    #[test]
    fn test_flat_secondary_falls_back_to_difference() {
        let mut window = RollingWindow::new(4);
        for p in [10.0, 11.0, 12.0] {
            window.push(p, 5.0);
        }
        let stats = window.stats().unwrap();
        assert_eq!(stats.hedge_ratio, 0.0);
        assert!((stats.spread - 12.0).abs() < 1e-12);
    }
}
