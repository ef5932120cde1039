//! # Agent Aggregate
//!
//! A reseller who earns commission on orders attributed to them.
//!
//! ## Invariants
//! - `total_earned` only grows, and only through [`Agent::credit_earnings`]
//!   with a commission `Approved` event. Creation and payment of a
//!   commission never touch it.
//! - Agents are never deleted; `deactivate` is the soft delete.
//!
//! ## Status Changes
//! ```text
//!   pending ──activate──► active ◄──activate── inactive
//!                          │  ▲                   ▲
//!                  suspend │  │ (admin review)    │ deactivate
//!                          ▼  │                   │
//!                       suspended ────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::commission::CommissionEvent;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::rate::{AgentTier, CommissionRate};
use crate::status::AgentStatus;
use crate::validation::{validate_code, validate_email, validate_name};

/// Default agent code for a storage id: `AGT0007`.
pub fn default_agent_code(id: i64) -> String {
    format!("AGT{:04}", id)
}

// =============================================================================
// Registration Input
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAgent {
    /// Business code. Generated from the id when absent.
    pub code: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub commission_rate: Option<CommissionRate>,
    pub tier: Option<AgentTier>,
    pub status: Option<AgentStatus>,
    pub team_id: Option<i64>,
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Registered {
        agent_id: i64,
        code: String,
        #[ts(as = "String")]
        occurred_at: DateTime<Utc>,
    },
    StatusChanged {
        agent_id: i64,
        from: AgentStatus,
        to: AgentStatus,
        #[ts(as = "String")]
        occurred_at: DateTime<Utc>,
    },
    TierChanged {
        agent_id: i64,
        from: AgentTier,
        to: AgentTier,
        #[ts(as = "String")]
        occurred_at: DateTime<Utc>,
    },
}

impl AgentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AgentEvent::Registered { .. } => "agent.registered",
            AgentEvent::StatusChanged { .. } => "agent.status_changed",
            AgentEvent::TierChanged { .. } => "agent.tier_changed",
        }
    }

    pub fn agent_id(&self) -> i64 {
        match self {
            AgentEvent::Registered { agent_id, .. }
            | AgentEvent::StatusChanged { agent_id, .. }
            | AgentEvent::TierChanged { agent_id, .. } => *agent_id,
        }
    }
}

// =============================================================================
// Storage Parts
// =============================================================================

#[derive(Debug, Clone)]
pub struct AgentParts {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub commission_rate: CommissionRate,
    pub tier: AgentTier,
    pub status: AgentStatus,
    pub total_earned: Money,
    pub team_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Agent
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Agent {
    id: i64,
    code: String,
    name: String,
    email: String,
    phone: Option<String>,
    commission_rate: CommissionRate,
    tier: AgentTier,
    status: AgentStatus,
    total_earned: Money,
    team_id: Option<i64>,
    #[ts(as = "String")]
    created_at: DateTime<Utc>,
    #[ts(as = "String")]
    updated_at: DateTime<Utc>,
}

impl Agent {
    /// Registers a new agent.
    ///
    /// Name and email are required. Rate falls back to `default_rate`,
    /// tier to bronze, status to active. The id is 0 and the code may be
    /// empty until [`Agent::with_id`] runs after insert.
    pub fn register(new: NewAgent, default_rate: CommissionRate, now: DateTime<Utc>) -> CoreResult<Self> {
        let name = validate_name("name", &new.name)?;
        let email = validate_email(&new.email)?;
        let code = match new.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => validate_code("code", code)?,
            _ => String::new(),
        };
        if let Some(team_id) = new.team_id {
            if team_id <= 0 {
                return Err(ValidationError::required("team_id").into());
            }
        }

        Ok(Agent {
            id: 0,
            code,
            name,
            email,
            phone: new.phone.filter(|p| !p.trim().is_empty()),
            commission_rate: new.commission_rate.unwrap_or(default_rate),
            tier: new.tier.unwrap_or_default(),
            status: new.status.unwrap_or_default(),
            total_earned: Money::zero(),
            team_id: new.team_id,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn restore(parts: AgentParts) -> Self {
        Agent {
            id: parts.id,
            code: parts.code,
            name: parts.name,
            email: parts.email,
            phone: parts.phone,
            commission_rate: parts.commission_rate,
            tier: parts.tier,
            status: parts.status,
            total_earned: parts.total_earned,
            team_id: parts.team_id,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    /// Records the storage id, filling in the default code if none was given.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        if self.code.is_empty() {
            self.code = default_agent_code(id);
        }
        self
    }

    pub fn registered_event(&self) -> AgentEvent {
        AgentEvent::Registered {
            agent_id: self.id,
            code: self.code.clone(),
            occurred_at: self.created_at,
        }
    }

    // =========================================================================
    // Commission Rules
    // =========================================================================

    /// Base rate plus the tier bonus, capped at 100%.
    pub fn effective_commission_rate(&self) -> CommissionRate {
        self.commission_rate.add_percentage(self.tier.bonus_percentage())
    }

    pub fn can_earn_commission(&self) -> bool {
        self.status.can_earn_commission()
    }

    /// Fails with `AgentNotEligible` unless the agent is active.
    pub fn ensure_can_earn(&self) -> CoreResult<()> {
        if !self.can_earn_commission() {
            return Err(CoreError::AgentNotEligible {
                agent_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Applies a commission lifecycle event. Only `Approved` credits
    /// `total_earned`; returns the amount credited (zero otherwise).
    pub fn credit_earnings(&mut self, event: &CommissionEvent, now: DateTime<Utc>) -> CoreResult<Money> {
        if event.agent_id() != self.id {
            return Err(ValidationError::InvalidFormat {
                field: "agent_id".to_string(),
                reason: format!(
                    "commission {} belongs to agent {}, not {}",
                    event.commission_id(),
                    event.agent_id(),
                    self.id
                ),
            }
            .into());
        }

        match event {
            CommissionEvent::Approved { amount, .. } if !amount.is_negative() => {
                self.total_earned += *amount;
                self.updated_at = now;
                Ok(*amount)
            }
            _ => Ok(Money::zero()),
        }
    }

    // =========================================================================
    // Tier and Rate
    // =========================================================================

    /// Moves up one tier. Fails at platinum.
    pub fn promote_tier(&mut self, now: DateTime<Utc>) -> CoreResult<AgentEvent> {
        if self.tier.is_top() {
            return Err(CoreError::AlreadyTopTier { agent_id: self.id });
        }
        let to = self.tier.next_tier();
        Ok(self.change_tier(to, now))
    }

    /// Sets the tier directly. Returns `None` when nothing changed.
    pub fn set_tier(&mut self, tier: AgentTier, now: DateTime<Utc>) -> Option<AgentEvent> {
        if tier == self.tier {
            return None;
        }
        Some(self.change_tier(tier, now))
    }

    fn change_tier(&mut self, to: AgentTier, now: DateTime<Utc>) -> AgentEvent {
        let from = self.tier;
        self.tier = to;
        self.updated_at = now;
        AgentEvent::TierChanged {
            agent_id: self.id,
            from,
            to,
            occurred_at: now,
        }
    }

    /// Changes the base rate. Existing commissions keep their frozen amount.
    pub fn set_commission_rate(&mut self, rate: CommissionRate, now: DateTime<Utc>) {
        self.commission_rate = rate;
        self.updated_at = now;
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// inactive/pending → active.
    pub fn activate(&mut self, now: DateTime<Utc>) -> CoreResult<AgentEvent> {
        if !self.status.can_be_activated() {
            return Err(self.invalid_status_change(AgentStatus::Active));
        }
        Ok(self.change_status(AgentStatus::Active, now))
    }

    /// active/pending → suspended.
    pub fn suspend(&mut self, now: DateTime<Utc>) -> CoreResult<AgentEvent> {
        if !matches!(self.status, AgentStatus::Active | AgentStatus::Pending) {
            return Err(self.invalid_status_change(AgentStatus::Suspended));
        }
        Ok(self.change_status(AgentStatus::Suspended, now))
    }

    /// Soft delete. Any status except inactive.
    pub fn deactivate(&mut self, now: DateTime<Utc>) -> CoreResult<AgentEvent> {
        if self.status == AgentStatus::Inactive {
            return Err(self.invalid_status_change(AgentStatus::Inactive));
        }
        Ok(self.change_status(AgentStatus::Inactive, now))
    }

    fn change_status(&mut self, to: AgentStatus, now: DateTime<Utc>) -> AgentEvent {
        let from = self.status;
        self.status = to;
        self.updated_at = now;
        AgentEvent::StatusChanged {
            agent_id: self.id,
            from,
            to,
            occurred_at: now,
        }
    }

    fn invalid_status_change(&self, to: AgentStatus) -> CoreError {
        CoreError::InvalidTransition {
            entity: "agent",
            id: self.id,
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    // =========================================================================
    // Team Membership
    // =========================================================================

    pub fn assign_to_team(&mut self, team_id: i64, now: DateTime<Utc>) -> CoreResult<()> {
        if team_id <= 0 {
            return Err(ValidationError::required("team_id").into());
        }
        self.team_id = Some(team_id);
        self.updated_at = now;
        Ok(())
    }

    pub fn remove_from_team(&mut self, now: DateTime<Utc>) {
        if self.team_id.take().is_some() {
            self.updated_at = now;
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn commission_rate(&self) -> CommissionRate {
        self.commission_rate
    }

    pub fn tier(&self) -> AgentTier {
        self.tier
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn total_earned(&self) -> Money {
        self.total_earned
    }

    pub fn team_id(&self) -> Option<i64> {
        self.team_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commission::{Commission, NewCommission};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 2, 10, 30, 0).unwrap()
    }

    fn agent() -> Agent {
        let new = NewAgent {
            name: "Nur Aisyah".to_string(),
            email: "aisyah@example.com".to_string(),
            commission_rate: Some(CommissionRate::new(5.0).unwrap()),
            ..Default::default()
        };
        Agent::register(new, CommissionRate::DEFAULT, t0()).unwrap().with_id(7)
    }

    #[test]
    fn test_register_defaults() {
        let new = NewAgent {
            name: "Daniel".to_string(),
            email: "daniel@example.com".to_string(),
            ..Default::default()
        };
        let a = Agent::register(new, CommissionRate::DEFAULT, t0()).unwrap().with_id(12);
        assert_eq!(a.code(), "AGT0012");
        assert_eq!(a.commission_rate().value(), 10.0);
        assert_eq!(a.tier(), AgentTier::Bronze);
        assert_eq!(a.status(), AgentStatus::Active);
        assert!(a.total_earned().is_zero());
        assert!(matches!(a.registered_event(), AgentEvent::Registered { agent_id: 12, .. }));
    }

    #[test]
    fn test_register_keeps_explicit_code() {
        let new = NewAgent {
            code: Some("KL-01".to_string()),
            name: "Mei Ling".to_string(),
            email: "mei@example.com".to_string(),
            ..Default::default()
        };
        let a = Agent::register(new, CommissionRate::DEFAULT, t0()).unwrap().with_id(3);
        assert_eq!(a.code(), "KL-01");
    }

    #[test]
    fn test_register_validation() {
        let missing_name = NewAgent {
            email: "x@example.com".to_string(),
            ..Default::default()
        };
        assert!(Agent::register(missing_name, CommissionRate::DEFAULT, t0()).is_err());

        let bad_email = NewAgent {
            name: "X".to_string(),
            email: "nope".to_string(),
            ..Default::default()
        };
        assert!(Agent::register(bad_email, CommissionRate::DEFAULT, t0()).is_err());
    }

    #[test]
    fn test_effective_rate_includes_tier_bonus() {
        let mut a = agent();
        assert_eq!(a.effective_commission_rate().value(), 5.0);
        a.set_tier(AgentTier::Gold, t0());
        assert_eq!(a.effective_commission_rate().value(), 7.0);
        a.set_commission_rate(CommissionRate::new(99.0).unwrap(), t0());
        assert_eq!(a.effective_commission_rate(), CommissionRate::MAX);
    }

    #[test]
    fn test_only_approval_credits_total_earned() {
        let mut a = agent();
        let new = NewCommission::new(7, "ORD-1", Money::from_major_minor(1000, 0), a.commission_rate());
        let mut c = Commission::create(new, t0()).unwrap().with_id(1);

        assert!(a.credit_earnings(&c.created_event(), t0()).unwrap().is_zero());
        let approved = c.approve(t0()).unwrap();
        assert_eq!(a.credit_earnings(&approved, t0()).unwrap(), c.amount());
        let paid = c.mark_as_paid(t0()).unwrap();
        assert!(a.credit_earnings(&paid, t0()).unwrap().is_zero());

        assert_eq!(a.total_earned(), Money::from_major_minor(50, 0));
    }

    #[test]
    fn test_credit_rejects_foreign_commission() {
        let mut a = agent();
        let event = CommissionEvent::Approved {
            commission_id: 1,
            agent_id: 99,
            amount: Money::from_cents(100),
            occurred_at: t0(),
        };
        assert!(a.credit_earnings(&event, t0()).is_err());
        assert!(a.total_earned().is_zero());
    }

    #[test]
    fn test_promote_until_top() {
        let mut a = agent();
        for expected in [AgentTier::Silver, AgentTier::Gold, AgentTier::Platinum] {
            let event = a.promote_tier(t0()).unwrap();
            assert!(matches!(event, AgentEvent::TierChanged { to, .. } if to == expected));
        }
        assert!(matches!(a.promote_tier(t0()), Err(CoreError::AlreadyTopTier { agent_id: 7 })));
        assert!(a.set_tier(AgentTier::Platinum, t0()).is_none());
    }

    #[test]
    fn test_status_changes() {
        let mut a = agent();
        assert!(a.activate(t0()).is_err());
        assert!(a.ensure_can_earn().is_ok());

        a.suspend(t0()).unwrap();
        assert!(matches!(a.ensure_can_earn(), Err(CoreError::AgentNotEligible { .. })));
        assert!(a.activate(t0()).is_err());

        a.deactivate(t0()).unwrap();
        assert!(a.deactivate(t0()).is_err());
        let event = a.activate(t0()).unwrap();
        assert_eq!(event.event_type(), "agent.status_changed");
        assert_eq!(a.status(), AgentStatus::Active);
    }

    #[test]
    fn test_team_membership() {
        let mut a = agent();
        a.assign_to_team(4, t0()).unwrap();
        assert_eq!(a.team_id(), Some(4));
        assert!(a.assign_to_team(0, t0()).is_err());
        a.remove_from_team(t0());
        assert_eq!(a.team_id(), None);
    }
}
