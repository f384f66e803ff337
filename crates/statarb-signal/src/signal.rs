//! Signal types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statarb_core::SpreadSide;
use std::fmt;

/// Classification of one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    /// Spread cheap: buy primary, sell secondary.
    LongSpread,
    /// Spread rich: sell primary, buy secondary.
    ShortSpread,
    /// Open LONG spread has reverted to the mean band.
    CloseLong,
    /// Open SHORT spread has reverted to the mean band.
    CloseShort,
    Hold,
}

impl SignalKind {
    #[must_use]
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::CloseLong | Self::CloseShort)
    }

    #[must_use]
    pub fn is_entry(&self) -> bool {
        matches!(self, Self::LongSpread | Self::ShortSpread)
    }

    /// Spread side this signal enters, if it is an entry signal.
    #[must_use]
    pub fn entry_side(&self) -> Option<SpreadSide> {
        match self {
            Self::LongSpread => Some(SpreadSide::Long),
            Self::ShortSpread => Some(SpreadSide::Short),
            _ => None,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LongSpread => write!(f, "LONG_SPREAD"),
            Self::ShortSpread => write!(f, "SHORT_SPREAD"),
            Self::CloseLong => write!(f, "CLOSE_LONG"),
            Self::CloseShort => write!(f, "CLOSE_SHORT"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// A classified snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub zscore: f64,
    pub at: DateTime<Utc>,
}
