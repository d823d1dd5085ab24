//! Core value types for the strategy runtime

use crate::constants::{FIXED_POINT_SCALE_F64, NANOS_PER_MILLI, NANOS_PER_SEC};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Numeric identifier of a tradable instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub u32);

impl InstrumentId {
    /// Create a new id
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw numeric value
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INST_{}", self.0)
    }
}

/// Side of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy side (bids)
    Bid,
    /// Sell side (asks/offers)
    Ask,
}

impl Side {
    /// Get the opposite side
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }

    /// True if `a` is a better price than `b` on this side
    #[must_use]
    pub fn is_better(&self, a: Px, b: Px) -> bool {
        match self {
            Self::Bid => a > b,
            Self::Ask => a < b,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => f.write_str("bid"),
            Self::Ask => f.write_str("ask"),
        }
    }
}

/// Price type (stored as i64 ticks for determinism, 4 decimal places)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Px(i64); // Internal: price in ticks (1 tick = 0.0001)

impl Px {
    /// Create a new Price from f64 (converts to ticks)
    ///
    /// Only for loaders and display code; book logic stays in ticks.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(value: f64) -> Self {
        Self((value * FIXED_POINT_SCALE_F64).round() as i64)
    }

    /// Get the price as f64
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / FIXED_POINT_SCALE_F64
    }

    /// Get price as i64 ticks
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Create from i64 ticks
    #[must_use]
    pub const fn from_i64(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Check if price is strictly positive
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// True if this price is a whole multiple of `tick`
    #[must_use]
    pub const fn is_multiple_of(&self, tick: Px) -> bool {
        tick.0 > 0 && self.0 % tick.0 == 0
    }

    /// Zero price
    pub const ZERO: Self = Self(0);
}

impl fmt::Display for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.as_f64())
    }
}

/// Quantity type for level sizes (stored as i64 units, 4 decimal places)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Qty(i64); // Internal: quantity in units (1 unit = 0.0001)

impl Qty {
    /// Create a new Quantity from f64
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(value: f64) -> Self {
        Self((value * FIXED_POINT_SCALE_F64).round() as i64)
    }

    /// Get the quantity as f64
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / FIXED_POINT_SCALE_F64
    }

    /// Get quantity as i64 units
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Create from i64 units
    #[must_use]
    pub const fn from_i64(units: i64) -> Self {
        Self(units)
    }

    /// Check if quantity is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Check if quantity is strictly positive
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Saturating addition
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Zero quantity
    pub const ZERO: Self = Self(0);
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.as_f64())
    }
}

/// Timestamp in nanoseconds since UNIX epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Ts(pub u64);

impl Ts {
    /// Get current wall-clock timestamp
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_nanos() as u64;
        Self(nanos)
    }

    /// Create timestamp from nanoseconds
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Create timestamp from whole seconds
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Get timestamp as nanoseconds
    #[must_use]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Get timestamp as milliseconds
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0 / NANOS_PER_MILLI
    }

    /// Timestamp shifted forward by `delay`, saturating at `u64::MAX`
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn saturating_add(self, delay: Duration) -> Self {
        let nanos = delay.as_nanos().min(u128::from(u64::MAX)) as u64;
        Self(self.0.saturating_add(nanos))
    }

    /// Elapsed duration since `earlier` (zero if `earlier` is later)
    #[must_use]
    pub const fn duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_px_fixed_point_conversions() {
        let px = Px::new(2450.55);
        assert_eq!(px.as_i64(), 24_505_500);
        assert!((px.as_f64() - 2450.55).abs() < 1e-9);
        assert_eq!(px.to_string(), "2450.5500");
    }

    #[test]
    fn test_px_tick_multiple() {
        let tick = Px::new(0.05);
        assert!(Px::new(100.10).is_multiple_of(tick));
        assert!(!Px::new(100.12).is_multiple_of(tick));
        assert!(!Px::new(100.0).is_multiple_of(Px::ZERO));
    }

    #[test]
    fn test_side_is_better() {
        assert!(Side::Bid.is_better(Px::from_i64(101), Px::from_i64(100)));
        assert!(Side::Ask.is_better(Px::from_i64(100), Px::from_i64(101)));
        assert_eq!(Side::Bid.opposite(), Side::Ask);
    }

    #[test]
    fn test_ts_arithmetic() {
        let ts = Ts::from_secs(10);
        let later = ts.saturating_add(Duration::from_millis(1500));
        assert_eq!(later.as_millis(), 11_500);
        assert_eq!(later.duration_since(ts), Duration::from_millis(1500));
        assert_eq!(ts.duration_since(later), Duration::ZERO);
        assert_eq!(Ts(u64::MAX).saturating_add(Duration::from_secs(1)), Ts(u64::MAX));
    }

    #[test]
    fn test_serde_transparent() -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(&(InstrumentId(7), Px::from_i64(5), Side::Ask))?;
        assert_eq!(json, r#"[7,5,"ask"]"#);
        Ok(())
    }
}
