//! # Money Module
//!
//! The `Money` type carries every monetary value in the agent ledger:
//! order totals, commission amounts, payout sums, dashboard rollups.
//!
//! ## Why Integer Minor Units?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  COMMISSION MATH WITH FLOATS                                            │
//! │                                                                         │
//! │    3500.00 × 7.5% = 262.49999999999997   ❌ drifts in rollups          │
//! │                                                                         │
//! │  COMMISSION MATH WITH MINOR UNITS + BASIS POINTS                        │
//! │                                                                         │
//! │    350000 × 750 / 10000 = 26250           ✅ exactly 262.50             │
//! │                                                                         │
//! │  A payout is the sum of its items; a dashboard is the sum of its       │
//! │  commissions. Integer sums never disagree with each other.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use agent_core::money::Money;
//! use agent_core::rate::CommissionRate;
//!
//! let subtotal = Money::from_major_minor(1000, 0);
//! let rate = CommissionRate::new(5.0).unwrap();
//!
//! assert_eq!(subtotal.apply_rate(rate), Money::from_major_minor(50, 0));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

use crate::rate::CommissionRate;

/// Basis points in one whole (100%).
pub(crate) const BPS_SCALE: i128 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents / sen).
///
/// ## Design Decisions
/// - **i64 (signed)**: rollups may subtract (unpaid = earned - paid)
/// - **Transparent JSON**: serialized as the bare integer, the same way it
///   is stored in SQLite
///
/// ## Where Money Flows
/// ```text
/// OrderContext.subtotal ──► calculate() ──► Commission.amount
///                                                  │
///                                   ┌──────────────┴──────────────┐
///                                   ▼                             ▼
///                          PayoutItem.amount ──► Payout.amount   Dashboard sums
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ```rust
    /// use agent_core::money::Money;
    ///
    /// let amount = Money::from_cents(26250); // 262.50
    /// assert_eq!(amount.cents(), 26250);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion, always 0-99.
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Applies a commission rate: `amount × rate / 100`.
    ///
    /// ## Implementation
    /// Integer math on basis points with half-up rounding:
    /// `(cents × bps + 5000) / 10000`, computed in i128 so large order
    /// totals cannot overflow.
    ///
    /// ## Example
    /// ```rust
    /// use agent_core::money::Money;
    /// use agent_core::rate::CommissionRate;
    ///
    /// let subtotal = Money::from_major_minor(3500, 0);
    /// let tier_rate = CommissionRate::new(7.5).unwrap();
    ///
    /// assert_eq!(subtotal.apply_rate(tier_rate).cents(), 26250);
    /// ```
    pub fn apply_rate(&self, rate: CommissionRate) -> Money {
        let raw = self.0 as i128 * rate.bps() as i128;
        let rounded = if raw >= 0 {
            (raw + BPS_SCALE / 2) / BPS_SCALE
        } else {
            (raw - BPS_SCALE / 2) / BPS_SCALE
        };
        Money(rounded as i64)
    }

    /// Divides this amount evenly across `count` units, rounding half-up.
    ///
    /// Returns zero when `count` is zero. Used for average order value,
    /// where an agent with no orders must report 0 instead of failing.
    pub fn average_over(&self, count: i64) -> Money {
        if count <= 0 {
            return Money::zero();
        }
        let total = self.0 as i128;
        let count = count as i128;
        Money(((total * 2 + count) / (count * 2)) as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Two-decimal rendering for logs. Currency symbols are a presentation concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(262, 50).cents(), 26250);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(26250).to_string(), "262.50");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_apply_rate_exact_cases() {
        let rate = |pct: f64| CommissionRate::new(pct).unwrap();

        assert_eq!(Money::from_major_minor(1000, 0).apply_rate(rate(5.0)).cents(), 5000);
        assert_eq!(Money::from_major_minor(3500, 0).apply_rate(rate(7.5)).cents(), 26250);
        assert_eq!(Money::from_major_minor(1500, 0).apply_rate(rate(7.0)).cents(), 10500);
    }

    #[test]
    fn test_apply_rate_rounds_half_up() {
        // 0.99 at 2.5% = 0.02475 → 0.02
        let rate = CommissionRate::new(2.5).unwrap();
        assert_eq!(Money::from_cents(99).apply_rate(rate).cents(), 2);

        // 0.10 at 5% = 0.005 → 0.01
        let rate = CommissionRate::new(5.0).unwrap();
        assert_eq!(Money::from_cents(10).apply_rate(rate).cents(), 1);
    }

    #[test]
    fn test_apply_rate_large_amount_does_not_overflow() {
        let huge = Money::from_cents(i64::MAX / 2);
        let full = CommissionRate::new(100.0).unwrap();
        assert_eq!(huge.apply_rate(full), huge);
    }

    #[test]
    fn test_average_over() {
        assert_eq!(Money::from_cents(1000).average_over(0), Money::zero());
        assert_eq!(Money::from_cents(1000).average_over(4).cents(), 250);
        // 10.00 / 3 = 3.333.. → 3.33
        assert_eq!(Money::from_cents(1000).average_over(3).cents(), 333);
        // 0.05 / 2 = 0.025 → 0.03
        assert_eq!(Money::from_cents(5).average_over(2).cents(), 3);
    }

    #[test]
    fn test_sum() {
        let items = [
            Money::from_major_minor(50, 0),
            Money::from_major_minor(75, 0),
            Money::from_major_minor(25, 0),
        ];
        let total: Money = items.iter().sum();
        assert_eq!(total, Money::from_major_minor(150, 0));
    }

    #[test]
    fn test_serializes_as_integer() {
        let json = serde_json::to_string(&Money::from_cents(150)).unwrap();
        assert_eq!(json, "150");
    }
}
