//! Snapshot classification rules.

use crate::error::{SignalError, SignalResult};
use crate::signal::{Signal, SignalKind};
use statarb_core::{MarketSnapshot, SpreadSide};

/// Thresholds for classification, in z-score units.
#[derive(Debug, Clone, Copy)]
pub struct SignalConfig {
    /// Entry fires when |z| moves beyond this.
    pub entry_threshold: f64,
    /// Exit fires when |z| has reverted inside this.
    pub exit_threshold: f64,
}

impl SignalConfig {
    pub fn validate(&self) -> SignalResult<()> {
        if self.entry_threshold <= 0.0 || self.exit_threshold < 0.0 {
            return Err(SignalError::InvalidConfig(format!(
                "thresholds must be positive (entry={}, exit={})",
                self.entry_threshold, self.exit_threshold
            )));
        }
        if self.exit_threshold >= self.entry_threshold {
            return Err(SignalError::InvalidConfig(format!(
                "exit threshold {} must be inside entry threshold {}",
                self.exit_threshold, self.entry_threshold
            )));
        }
        Ok(())
    }
}

/// Stateless classifier.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    #[must_use]
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn set_entry_threshold(&mut self, entry_threshold: f64) {
        self.config.entry_threshold = entry_threshold;
    }

    pub fn set_exit_threshold(&mut self, exit_threshold: f64) {
        self.config.exit_threshold = exit_threshold;
    }

    /// Classify a snapshot given the current position side.
    ///
    /// Exit classification wins over everything: an open position inside
    /// the exit band closes regardless of what else the z-score implies.
    #[must_use]
    pub fn classify(&self, snapshot: &MarketSnapshot, current_side: Option<SpreadSide>) -> Signal {
        let z = snapshot.zscore;

        let kind = match current_side {
            Some(side) if z.abs() <= self.config.exit_threshold => match side {
                SpreadSide::Long => SignalKind::CloseLong,
                SpreadSide::Short => SignalKind::CloseShort,
            },
            // Open position outside the exit band: further divergence is a
            // pyramid question for the grid, not a fresh entry signal.
            Some(_) => SignalKind::Hold,
            None => {
                if z < -self.config.entry_threshold {
                    SignalKind::LongSpread
                } else if z > self.config.entry_threshold {
                    SignalKind::ShortSpread
                } else {
                    SignalKind::Hold
                }
            }
        };

        Signal {
            kind,
            zscore: z,
            at: snapshot.timestamp,
        }
    }
}
