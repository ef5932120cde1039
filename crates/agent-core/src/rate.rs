//! # Rates and Tiers
//!
//! Value objects that decide *how much* of an order an agent earns.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CommissionRate                     AgentTier                           │
//! │  ─────────────────────────────      ──────────────────────────────      │
//! │  basis points, 0..=10000            Bronze   level 1   +0%              │
//! │  750 bps = 7.50%                    Silver   level 2   +1%              │
//! │  add / add_percentage cap at 100%   Gold     level 3   +2%  (premium)   │
//! │                                     Platinum level 4   +3%  (premium)   │
//! │                                                                         │
//! │  effective rate = base (or volume tier) + team boost + tier bonus       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rates are stored at basis-point precision (two decimals of a percent),
//! the same precision the ledger persists, so `new(7.5).value() == 7.5`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

/// 100% in basis points.
const MAX_BPS: u32 = 10_000;

// =============================================================================
// Commission Rate
// =============================================================================

/// A commission percentage in [0, 100], held in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct CommissionRate(u32);

impl CommissionRate {
    /// 0%.
    pub const ZERO: CommissionRate = CommissionRate(0);

    /// 100%, the ceiling every composition saturates at.
    pub const MAX: CommissionRate = CommissionRate(MAX_BPS);

    /// 10%, the rate new agents and teams get when none is configured.
    pub const DEFAULT: CommissionRate = CommissionRate(1_000);

    /// Creates a rate from a percentage.
    ///
    /// Fails with `InvalidRange` when `pct` is outside [0, 100] or not a
    /// finite number. Values are rounded to the nearest basis point.
    ///
    /// ```rust
    /// use agent_core::rate::CommissionRate;
    ///
    /// assert_eq!(CommissionRate::new(7.5).unwrap().value(), 7.5);
    /// assert!(CommissionRate::new(100.01).is_err());
    /// assert!(CommissionRate::new(-1.0).is_err());
    /// ```
    pub fn new(pct: f64) -> Result<Self, ValidationError> {
        if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
            return Err(ValidationError::InvalidRange {
                field: "commission_rate".to_string(),
                value: pct,
                min: 0.0,
                max: 100.0,
            });
        }
        Ok(CommissionRate((pct * 100.0).round() as u32))
    }

    /// Creates a rate from basis points (750 = 7.50%).
    pub fn from_bps(bps: u32) -> Result<Self, ValidationError> {
        if bps > MAX_BPS {
            return Err(ValidationError::InvalidRange {
                field: "commission_rate".to_string(),
                value: bps as f64 / 100.0,
                min: 0.0,
                max: 100.0,
            });
        }
        Ok(CommissionRate(bps))
    }

    /// Rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Rate as a percentage (7.5 for 7.5%).
    #[inline]
    pub fn value(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Rate as a fraction (0.075 for 7.5%).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / MAX_BPS as f64
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Commission on `amount` at this rate.
    #[inline]
    pub fn calculate_commission(&self, amount: Money) -> Money {
        amount.apply_rate(*self)
    }

    /// Adds two rates, capped at 100%.
    pub fn add(&self, other: CommissionRate) -> CommissionRate {
        CommissionRate((self.0 + other.0).min(MAX_BPS))
    }

    /// Adds a bonus expressed as a fraction of the order total
    /// (`0.02` adds two percentage points), capped at 100%.
    ///
    /// Negative or non-finite bonuses add nothing.
    pub fn add_percentage(&self, bonus_fraction: f64) -> CommissionRate {
        if !bonus_fraction.is_finite() || bonus_fraction <= 0.0 {
            return *self;
        }
        let bonus_bps = (bonus_fraction * MAX_BPS as f64).round();
        let bonus_bps = if bonus_bps >= MAX_BPS as f64 {
            MAX_BPS
        } else {
            bonus_bps as u32
        };
        CommissionRate((self.0 + bonus_bps).min(MAX_BPS))
    }

    #[inline]
    pub fn is_higher_than(&self, other: CommissionRate) -> bool {
        self.0 > other.0
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        CommissionRate::DEFAULT
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Agent Tier
// =============================================================================

/// Loyalty level of an agent. Ordering follows the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AgentTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl AgentTier {
    pub const ALL: [AgentTier; 4] = [
        AgentTier::Bronze,
        AgentTier::Silver,
        AgentTier::Gold,
        AgentTier::Platinum,
    ];

    /// Bonus earned on top of the commission rate, as a fraction of the
    /// order total (0.02 = two extra percentage points).
    pub fn bonus_percentage(&self) -> f64 {
        match self {
            AgentTier::Bronze => 0.0,
            AgentTier::Silver => 0.01,
            AgentTier::Gold => 0.02,
            AgentTier::Platinum => 0.03,
        }
    }

    /// Numeric level, 1 for bronze through 4 for platinum.
    pub fn level(&self) -> u8 {
        match self {
            AgentTier::Bronze => 1,
            AgentTier::Silver => 2,
            AgentTier::Gold => 3,
            AgentTier::Platinum => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgentTier::Bronze => "Bronze",
            AgentTier::Silver => "Silver",
            AgentTier::Gold => "Gold",
            AgentTier::Platinum => "Platinum",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentTier::Bronze => "bronze",
            AgentTier::Silver => "silver",
            AgentTier::Gold => "gold",
            AgentTier::Platinum => "platinum",
        }
    }

    #[inline]
    pub fn is_higher_than(&self, other: AgentTier) -> bool {
        self > &other
    }

    /// Gold and platinum.
    #[inline]
    pub fn is_premium(&self) -> bool {
        *self >= AgentTier::Gold
    }

    /// The next tier up. Platinum stays platinum.
    pub fn next_tier(&self) -> AgentTier {
        match self {
            AgentTier::Bronze => AgentTier::Silver,
            AgentTier::Silver => AgentTier::Gold,
            AgentTier::Gold | AgentTier::Platinum => AgentTier::Platinum,
        }
    }

    #[inline]
    pub fn is_top(&self) -> bool {
        *self == AgentTier::Platinum
    }
}

impl Default for AgentTier {
    fn default() -> Self {
        AgentTier::Bronze
    }
}

impl fmt::Display for AgentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bronze" => Ok(AgentTier::Bronze),
            "silver" => Ok(AgentTier::Silver),
            "gold" => Ok(AgentTier::Gold),
            "platinum" => Ok(AgentTier::Platinum),
            _ => Err(ValidationError::NotAllowed {
                field: "tier".to_string(),
                allowed: AgentTier::ALL.iter().map(|t| t.as_str().to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_round_trips_two_decimal_values() {
        for pct in [0.0, 0.01, 2.5, 5.0, 7.5, 12.34, 33.33, 99.99, 100.0] {
            assert_eq!(CommissionRate::new(pct).unwrap().value(), pct);
        }
    }

    #[test]
    fn test_rate_rejects_out_of_range() {
        for pct in [-0.01, -10.0, 100.01, 250.0, f64::NAN, f64::INFINITY] {
            let err = CommissionRate::new(pct).unwrap_err();
            assert!(matches!(err, ValidationError::InvalidRange { .. }));
        }
        assert!(CommissionRate::from_bps(10_001).is_err());
        assert!(CommissionRate::from_bps(10_000).is_ok());
    }

    #[test]
    fn test_add_caps_at_hundred() {
        let a = CommissionRate::new(60.0).unwrap();
        let b = CommissionRate::new(55.5).unwrap();
        assert_eq!(a.add(b), CommissionRate::MAX);

        let c = CommissionRate::new(5.0).unwrap();
        let d = CommissionRate::new(2.0).unwrap();
        assert_eq!(c.add(d).value(), 7.0);
    }

    #[test]
    fn test_add_percentage_caps_at_hundred() {
        let base = CommissionRate::new(10.0).unwrap();
        assert_eq!(base.add_percentage(0.02).value(), 12.0);
        assert_eq!(base.add_percentage(0.95), CommissionRate::MAX);
        assert_eq!(base.add_percentage(5.0), CommissionRate::MAX);
        assert_eq!(CommissionRate::MAX.add_percentage(0.03), CommissionRate::MAX);
        assert_eq!(base.add_percentage(-0.5), base);
    }

    #[test]
    fn test_rate_accessors_and_display() {
        let rate = CommissionRate::new(7.5).unwrap();
        assert_eq!(rate.bps(), 750);
        assert!((rate.percentage() - 0.075).abs() < f64::EPSILON);
        assert_eq!(rate.to_string(), "7.50%");
        assert_eq!(CommissionRate::default().value(), 10.0);
        assert!(rate.is_higher_than(CommissionRate::new(5.0).unwrap()));
        assert!(!rate.is_higher_than(rate));
    }

    #[test]
    fn test_calculate_commission() {
        let rate = CommissionRate::new(10.0).unwrap();
        assert_eq!(
            rate.calculate_commission(Money::from_major_minor(250, 0)),
            Money::from_major_minor(25, 0)
        );
    }

    #[test]
    fn test_tier_bonus_and_levels() {
        assert_eq!(AgentTier::Bronze.bonus_percentage(), 0.0);
        assert_eq!(AgentTier::Silver.bonus_percentage(), 0.01);
        assert_eq!(AgentTier::Gold.bonus_percentage(), 0.02);
        assert_eq!(AgentTier::Platinum.bonus_percentage(), 0.03);

        let levels: Vec<u8> = AgentTier::ALL.iter().map(|t| t.level()).collect();
        assert_eq!(levels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_tier_next_is_idempotent_at_top() {
        assert_eq!(AgentTier::Bronze.next_tier(), AgentTier::Silver);
        assert_eq!(AgentTier::Silver.next_tier(), AgentTier::Gold);
        assert_eq!(AgentTier::Gold.next_tier(), AgentTier::Platinum);
        assert_eq!(AgentTier::Platinum.next_tier(), AgentTier::Platinum);
    }

    #[test]
    fn test_tier_ordering_and_premium() {
        assert!(AgentTier::Gold.is_higher_than(AgentTier::Silver));
        assert!(!AgentTier::Bronze.is_higher_than(AgentTier::Bronze));
        assert!(!AgentTier::Silver.is_premium());
        assert!(AgentTier::Gold.is_premium());
        assert!(AgentTier::Platinum.is_premium());
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("GOLD".parse::<AgentTier>().unwrap(), AgentTier::Gold);
        assert_eq!(" platinum ".parse::<AgentTier>().unwrap(), AgentTier::Platinum);
        assert!("diamond".parse::<AgentTier>().is_err());
        assert_eq!(AgentTier::Silver.to_string(), "silver");
        assert_eq!(AgentTier::Silver.label(), "Silver");
    }
}
