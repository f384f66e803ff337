//! Shared market and identity types.

use crate::decimal::{Lots, Price};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard deviations below this are treated as zero when computing
/// z-scores, so a flat window yields z = 0 rather than ±infinity.
pub const ZSCORE_STD_EPSILON: f64 = 1e-9;

/// Direction of a spread position.
///
/// LONG means long primary / short secondary (entered when the z-score is
/// deeply negative); SHORT is the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpreadSide {
    Long,
    Short,
}

impl SpreadSide {
    /// Broker order action for the primary leg.
    #[must_use]
    pub fn primary_action(&self) -> OrderAction {
        match self {
            Self::Long => OrderAction::Buy,
            Self::Short => OrderAction::Sell,
        }
    }

    /// Broker order action for the secondary leg (opposite of primary).
    #[must_use]
    pub fn secondary_action(&self) -> OrderAction {
        self.primary_action().opposite()
    }

    /// Direction the z-score moves when the spread diverges further on
    /// this side: -1 for LONG (more negative), +1 for SHORT.
    #[must_use]
    pub fn zscore_sign(&self) -> f64 {
        match self {
            Self::Long => -1.0,
            Self::Short => 1.0,
        }
    }
}

impl fmt::Display for SpreadSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Market order action on a single symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Identifier shared by the two legs of one logical spread position.
///
/// Derived from the broker ticket pair once both legs fill; sentinel states
/// created before order submission carry a UUID instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpreadId(pub String);

impl SpreadId {
    #[must_use]
    pub fn from_tickets(primary_ticket: u64, secondary_ticket: u64) -> Self {
        Self(format!("{primary_ticket}-{secondary_ticket}"))
    }

    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Short prefix used in order comments and log lines.
    #[must_use]
    pub fn prefix(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal identifier for a single persisted leg.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub String);

impl PositionId {
    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable per-symbol contract specification, fetched lazily from the
/// broker and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub symbol: String,
    /// Units of the underlying per 1.0 lot.
    pub contract_size: f64,
    pub lot_step: Lots,
    pub min_lot: Lots,
    pub max_lot: Lots,
    pub tick_size: Price,
}

impl SymbolSpec {
    /// Round a raw volume onto the symbol's lot grid and limits.
    ///
    /// Volumes that round below the minimum lot come back as zero; the
    /// caller decides whether a sub-minimum intent trades at all.
    #[must_use]
    pub fn normalize_lots(&self, raw: Lots) -> Lots {
        let stepped = raw.round_to_step(self.lot_step);
        if stepped < self.min_lot {
            Lots::ZERO
        } else if stepped > self.max_lot {
            self.max_lot
        } else {
            stepped
        }
    }
}

/// One tick of the rolling spread statistics.
///
/// Produced by the market-data collector on every update; never mutated
/// after construction. Prices are in the statistics domain (`f64`) because
/// everything downstream of the snapshot is statistical arithmetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    pub primary_bid: f64,
    pub primary_ask: f64,
    pub secondary_bid: f64,
    pub secondary_ask: f64,
    /// `primary − hedge_ratio × secondary` on bid closes.
    pub spread: f64,
    /// Rolling mean of the spread over the window.
    pub spread_mean: f64,
    /// Rolling sample standard deviation of the spread.
    pub spread_std: f64,
    /// `(spread − mean) / std`, or 0 when the std is below epsilon.
    pub zscore: f64,
    /// Rolling regression beta of primary on secondary.
    pub hedge_ratio: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_leg_actions() {
        assert_eq!(SpreadSide::Long.primary_action(), OrderAction::Buy);
        assert_eq!(SpreadSide::Long.secondary_action(), OrderAction::Sell);
        assert_eq!(SpreadSide::Short.primary_action(), OrderAction::Sell);
        assert_eq!(SpreadSide::Short.secondary_action(), OrderAction::Buy);
    }

    #[test]
    fn test_spread_id_from_tickets() {
        let id = SpreadId::from_tickets(111, 222);
        assert_eq!(id.as_str(), "111-222");
        assert_eq!(id.prefix(), "111-222");

        let long_id = SpreadId(String::from("0123456789abcdef"));
        assert_eq!(long_id.prefix(), "01234567");
    }

    #[test]
    fn test_normalize_lots() {
        use rust_decimal_macros::dec;

        let spec = SymbolSpec {
            symbol: "XAUUSD".to_string(),
            contract_size: 100.0,
            lot_step: Lots::new(dec!(0.01)),
            min_lot: Lots::new(dec!(0.01)),
            max_lot: Lots::new(dec!(50)),
            tick_size: Price::new(dec!(0.01)),
        };

        assert_eq!(spec.normalize_lots(Lots::new(dec!(0.12789))).0, dec!(0.12));
        assert_eq!(spec.normalize_lots(Lots::new(dec!(0.001))), Lots::ZERO);
        assert_eq!(spec.normalize_lots(Lots::new(dec!(99))).0, dec!(50));
    }
}
