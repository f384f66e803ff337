//! Grid state for one open spread.

use crate::decimal::Lots;
use crate::types::{SpreadId, SpreadSide};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two-variable grid state of an open spread position.
///
/// `last_z_entry` and `next_z_entry` fully describe when the next pyramid
/// fires; `next_z_entry` always sits one scale interval further from the
/// mean than `last_z_entry`. One state exists per open spread, and while
/// any state exists no new initial entry may be made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadEntryState {
    pub spread_id: SpreadId,
    pub side: SpreadSide,
    /// Z-score of the last fill.
    pub last_z_entry: f64,
    /// Z-score that triggers the next pyramid (non-strict comparison).
    pub next_z_entry: f64,
    /// Number of fills so far; 0 only on a sentinel awaiting its first fill.
    pub entry_count: u32,
    pub total_primary_lots: Lots,
    pub total_secondary_lots: Lots,
    /// Spread mean at first entry, kept for mean-drift attribution.
    pub first_entry_spread_mean: f64,
}

impl SpreadEntryState {
    /// Project the trigger level one interval further from the mean.
    #[must_use]
    pub fn project_next(side: SpreadSide, zscore: f64, scale_interval: f64) -> f64 {
        zscore + side.zscore_sign() * scale_interval
    }

    /// State after a first fill at `zscore`.
    #[must_use]
    pub fn first_entry(
        spread_id: SpreadId,
        side: SpreadSide,
        zscore: f64,
        scale_interval: f64,
        primary_lots: Lots,
        secondary_lots: Lots,
        spread_mean: f64,
    ) -> Self {
        Self {
            spread_id,
            side,
            last_z_entry: zscore,
            next_z_entry: Self::project_next(side, zscore, scale_interval),
            entry_count: 1,
            total_primary_lots: primary_lots,
            total_secondary_lots: secondary_lots,
            first_entry_spread_mean: spread_mean,
        }
    }

    /// Sentinel inserted before the first orders go out, so concurrent
    /// snapshots cannot race into a second initial entry.
    #[must_use]
    pub fn sentinel(side: SpreadSide, zscore: f64, scale_interval: f64) -> Self {
        Self {
            spread_id: SpreadId::random(),
            side,
            last_z_entry: zscore,
            next_z_entry: Self::project_next(side, zscore, scale_interval),
            entry_count: 0,
            total_primary_lots: Lots::ZERO,
            total_secondary_lots: Lots::ZERO,
            first_entry_spread_mean: 0.0,
        }
    }

    /// Re-anchor the trigger after a runtime `scale_interval` change,
    /// preserving `last_z_entry`.
    pub fn recompute_next(&mut self, scale_interval: f64) {
        self.next_z_entry = Self::project_next(self.side, self.last_z_entry, scale_interval);
    }
}

impl fmt::Display for SpreadEntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Spread {}: {} | last_z={:.2} | next_z={:.2} | entries={}",
            self.spread_id.prefix(),
            self.side,
            self.last_z_entry,
            self.next_z_entry,
            self.entry_count
        )
    }
}
