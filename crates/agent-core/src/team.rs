//! # Team
//!
//! A sales team. Members reference the team by id; the team does not own
//! them. An active team adds its boost to every member's commission rate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreResult;
use crate::money::Money;
use crate::rate::CommissionRate;
use crate::validation::{validate_code, validate_name, validate_non_negative_amount};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Team {
    pub id: i64,
    pub code: String,
    pub name: String,
    /// Agent leading the team, if any.
    pub leader_id: Option<i64>,
    pub monthly_target: Money,
    /// Added to each member's rate while the team is active.
    pub commission_boost: CommissionRate,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Team {
    /// Creates an active team. A missing boost means 0%.
    pub fn new(
        code: &str,
        name: &str,
        commission_boost: Option<CommissionRate>,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let code = validate_code("team code", code)?;
        let name = validate_name("team name", name)?;

        Ok(Team {
            id: 0,
            code,
            name,
            leader_id: None,
            monthly_target: Money::zero(),
            commission_boost: commission_boost.unwrap_or(CommissionRate::ZERO),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// The boost members actually receive: nothing while inactive.
    pub fn effective_boost(&self) -> CommissionRate {
        if self.is_active {
            self.commission_boost
        } else {
            CommissionRate::ZERO
        }
    }

    pub fn set_target(&mut self, target: Money, now: DateTime<Utc>) -> CoreResult<()> {
        validate_non_negative_amount("monthly_target", target)?;
        self.monthly_target = target;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_commission_boost(&mut self, boost: CommissionRate, now: DateTime<Utc>) {
        self.commission_boost = boost;
        self.updated_at = now;
    }

    pub fn set_leader(&mut self, leader_id: Option<i64>, now: DateTime<Utc>) {
        self.leader_id = leader_id.filter(|id| *id > 0);
        self.updated_at = now;
    }

    #[inline]
    pub fn has_leader(&self) -> bool {
        self.leader_id.is_some()
    }

    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.is_active = true;
        self.updated_at = now;
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_new_team() {
        let team = Team::new("TEAM-KL", "Kuala Lumpur", None, t0()).unwrap();
        assert!(team.is_active);
        assert!(team.commission_boost.is_zero());
        assert!(!team.has_leader());

        assert!(Team::new("", "Nameless", None, t0()).is_err());
        assert!(Team::new("TEAM-X", "  ", None, t0()).is_err());
    }

    #[test]
    fn test_inactive_team_gives_no_boost() {
        let boost = CommissionRate::new(2.0).unwrap();
        let mut team = Team::new("TEAM-PG", "Penang", Some(boost), t0()).unwrap();
        assert_eq!(team.effective_boost(), boost);

        team.deactivate(t0());
        assert_eq!(team.effective_boost(), CommissionRate::ZERO);
        team.activate(t0());
        assert_eq!(team.effective_boost(), boost);
    }

    #[test]
    fn test_target_and_leader() {
        let mut team = Team::new("TEAM-JB", "Johor", None, t0()).unwrap();
        team.set_target(Money::from_major_minor(50_000, 0), t0()).unwrap();
        assert!(team.set_target(Money::from_cents(-1), t0()).is_err());
        assert_eq!(team.monthly_target, Money::from_major_minor(50_000, 0));

        team.set_leader(Some(3), t0());
        assert!(team.has_leader());
        team.set_leader(None, t0());
        assert!(!team.has_leader());
    }
}
