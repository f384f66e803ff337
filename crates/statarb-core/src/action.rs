//! Typed actions flowing from the signal worker to the execution worker.

use crate::decimal::Lots;
use crate::types::{MarketSnapshot, OrderAction, SpreadId, SpreadSide};
use serde::{Deserialize, Serialize};

/// One-shot volume correction produced by the rebalancer and consumed once
/// by the execution worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeAdjustment {
    pub spread_id: SpreadId,
    pub symbol: String,
    pub action: OrderAction,
    pub quantity: Lots,
    pub reason: String,
    pub old_hedge: f64,
    pub new_hedge: f64,
}

/// Unit of work on the action queue.
#[derive(Debug, Clone)]
pub enum Action {
    /// Close every position under the strategy tag and reset grid state.
    Exit {
        side: SpreadSide,
        zscore: f64,
    },
    /// Let the unified executor decide between initial entry, pyramid, or
    /// nothing, based on its 2-variable grid state.
    EntryOrPyramid {
        snapshot: MarketSnapshot,
        /// Side an initial entry would take, when the classifier fired one.
        entry_side: Option<SpreadSide>,
        current_side: Option<SpreadSide>,
        spread_id: Option<SpreadId>,
    },
    /// Single-leg volume correction.
    VolumeRebalance {
        adjustment: VolumeAdjustment,
        snapshot: MarketSnapshot,
    },
}

impl Action {
    /// Exits preempt everything else on the queue.
    #[must_use]
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Exit { .. })
    }

    /// Short tag for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Exit { .. } => "EXIT",
            Self::EntryOrPyramid { .. } => "ENTRY_OR_PYRAMID",
            Self::VolumeRebalance { .. } => "VOLUME_REBALANCE",
        }
    }
}
