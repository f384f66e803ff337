//! Precision-safe decimal types for trading.
//!
//! Uses `rust_decimal` for exact decimal arithmetic on everything that is
//! sent to or received from the broker (prices, lot volumes). Rolling
//! statistics stay in `f64`; conversions happen at this boundary.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

/// Price with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Round down to the symbol's tick size.
    #[inline]
    pub fn round_to_tick(&self, tick_size: Price) -> Self {
        if tick_size.is_zero() {
            return *self;
        }
        Self((self.0 / tick_size.0).floor() * tick_size.0)
    }

    /// Lossy conversion into the statistics domain.
    #[inline]
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Construct from a statistics-domain value.
    ///
    /// Returns `Price::ZERO` for NaN/infinite inputs.
    #[inline]
    pub fn from_f64(value: f64) -> Self {
        Self(Decimal::from_f64(value).unwrap_or(Decimal::ZERO))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Decimal> for Price {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

/// Lot volume with exact decimal precision.
///
/// Wraps `Decimal` to prevent mixing volumes with prices in calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lots(pub Decimal);

impl Lots {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Round down to the symbol's lot step.
    #[inline]
    pub fn round_to_step(&self, lot_step: Lots) -> Self {
        if lot_step.is_zero() {
            return *self;
        }
        Self((self.0 / lot_step.0).floor() * lot_step.0)
    }

    /// Clamp into the `[min_lot, max_lot]` range of a symbol.
    ///
    /// A volume below `min_lot` clamps up; the caller decides whether
    /// sub-minimum intents should trade at all.
    #[inline]
    pub fn clamp(&self, min_lot: Lots, max_lot: Lots) -> Self {
        Self(self.0.clamp(min_lot.0, max_lot.0))
    }

    #[inline]
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Construct from a statistics-domain value.
    ///
    /// Returns `Lots::ZERO` for NaN/infinite inputs.
    #[inline]
    pub fn from_f64(value: f64) -> Self {
        Self(Decimal::from_f64(value).unwrap_or(Decimal::ZERO))
    }
}

impl fmt::Display for Lots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Lots {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Lots {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Lots {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Lots {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Lots {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Decimal> for Lots {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_round_to_tick() {
        let price = Price::new(dec!(2345.6789));
        let tick = Price::new(dec!(0.01));

        assert_eq!(price.round_to_tick(tick).0, dec!(2345.67));
    }

    #[test]
    fn test_lots_round_to_step() {
        let lots = Lots::new(dec!(1.2345));
        let step = Lots::new(dec!(0.01));

        assert_eq!(lots.round_to_step(step).0, dec!(1.23));
    }

    #[test]
    fn test_lots_clamp() {
        let min = Lots::new(dec!(0.01));
        let max = Lots::new(dec!(50));

        assert_eq!(Lots::new(dec!(0.004)).clamp(min, max), min);
        assert_eq!(Lots::new(dec!(120)).clamp(min, max), max);
        assert_eq!(Lots::new(dec!(1.5)).clamp(min, max).0, dec!(1.5));
    }

    #[test]
    fn test_f64_round_trip() {
        let lots = Lots::from_f64(0.25);
        assert_eq!(lots.0, dec!(0.25));
        assert!((lots.to_f64() - 0.25).abs() < 1e-12);

        assert_eq!(Lots::from_f64(f64::NAN), Lots::ZERO);
    }
}
