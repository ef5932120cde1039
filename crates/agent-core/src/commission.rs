//! # Commission Entity
//!
//! One commission per attributed order. The amount is decided once, at
//! creation, and never recomputed: later changes to the agent's rate or
//! tier do not touch commissions that already exist.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create()          → pending     emits Created                          │
//! │  approve()         → approved    emits Approved  (credits Agent)        │
//! │  mark_as_paid()    → paid        emits Paid                             │
//! │  cancel(reason)    → cancelled   emits Cancelled                        │
//! │                                                                         │
//! │  approve()      on non-pending   → InvalidTransition                    │
//! │  mark_as_paid() on non-approved  → NotApproved                          │
//! │  cancel()       on paid/cancelled → AlreadyTerminal                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutating method returns the event it produced. Nothing is buffered
//! on the entity; the caller decides where events go (the ledger writes
//! them to the outbox in the same transaction as the row update).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::calculator::{BreakdownItem, CommissionCalculation};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::rate::CommissionRate;
use crate::status::CommissionStatus;
use crate::validation::{validate_agent_id, validate_order_id, validate_positive_amount};

// =============================================================================
// Construction Input
// =============================================================================

/// Everything needed to open a commission for an order.
#[derive(Debug, Clone)]
pub struct NewCommission {
    pub agent_id: i64,
    pub order_id: String,
    /// Customer reference from the order service, used for customer counts.
    pub customer_ref: Option<String>,
    /// The base the rate applies to (order subtotal).
    pub order_total: Money,
    pub rate: CommissionRate,
    /// Explicit amount. When `None` the amount is `rate × order_total`.
    pub amount: Option<Money>,
    pub tier_applied: Option<String>,
    pub breakdown: Vec<BreakdownItem>,
}

impl NewCommission {
    /// A plain commission at `rate` with no bonuses.
    pub fn new(agent_id: i64, order_id: impl Into<String>, order_total: Money, rate: CommissionRate) -> Self {
        NewCommission {
            agent_id,
            order_id: order_id.into(),
            customer_ref: None,
            order_total,
            rate,
            amount: None,
            tier_applied: None,
            breakdown: Vec::new(),
        }
    }

    /// Freezes a calculator result into a commission input.
    pub fn from_calculation(calc: &CommissionCalculation, customer_ref: Option<String>) -> Self {
        NewCommission {
            agent_id: calc.agent_id,
            order_id: calc.order_id.clone(),
            customer_ref,
            order_total: calc.based_on_amount,
            rate: calc.commission_rate,
            amount: Some(calc.commission_amount),
            tier_applied: calc.tier_applied.clone(),
            breakdown: calc.breakdown.clone(),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Lifecycle event produced by a commission transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommissionEvent {
    Created {
        commission_id: i64,
        agent_id: i64,
        order_id: String,
        amount: Money,
        #[ts(as = "String")]
        occurred_at: DateTime<Utc>,
    },
    Approved {
        commission_id: i64,
        agent_id: i64,
        amount: Money,
        #[ts(as = "String")]
        occurred_at: DateTime<Utc>,
    },
    Paid {
        commission_id: i64,
        agent_id: i64,
        amount: Money,
        #[ts(as = "String")]
        occurred_at: DateTime<Utc>,
    },
    Cancelled {
        commission_id: i64,
        agent_id: i64,
        reason: Option<String>,
        #[ts(as = "String")]
        occurred_at: DateTime<Utc>,
    },
}

impl CommissionEvent {
    /// Stable name used as the outbox `event_type`.
    pub fn event_type(&self) -> &'static str {
        match self {
            CommissionEvent::Created { .. } => "commission.created",
            CommissionEvent::Approved { .. } => "commission.approved",
            CommissionEvent::Paid { .. } => "commission.paid",
            CommissionEvent::Cancelled { .. } => "commission.cancelled",
        }
    }

    pub fn commission_id(&self) -> i64 {
        match self {
            CommissionEvent::Created { commission_id, .. }
            | CommissionEvent::Approved { commission_id, .. }
            | CommissionEvent::Paid { commission_id, .. }
            | CommissionEvent::Cancelled { commission_id, .. } => *commission_id,
        }
    }

    pub fn agent_id(&self) -> i64 {
        match self {
            CommissionEvent::Created { agent_id, .. }
            | CommissionEvent::Approved { agent_id, .. }
            | CommissionEvent::Paid { agent_id, .. }
            | CommissionEvent::Cancelled { agent_id, .. } => *agent_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CommissionEvent::Created { occurred_at, .. }
            | CommissionEvent::Approved { occurred_at, .. }
            | CommissionEvent::Paid { occurred_at, .. }
            | CommissionEvent::Cancelled { occurred_at, .. } => *occurred_at,
        }
    }
}

// =============================================================================
// Storage Parts
// =============================================================================

/// The full stored shape of a commission, used to rebuild the entity from a
/// row. Only the persistence layer should need this.
#[derive(Debug, Clone)]
pub struct CommissionParts {
    pub id: i64,
    pub agent_id: i64,
    pub order_id: String,
    pub customer_ref: Option<String>,
    pub order_total: Money,
    pub rate: CommissionRate,
    pub amount: Money,
    pub status: CommissionStatus,
    pub tier_applied: Option<String>,
    pub breakdown: Vec<BreakdownItem>,
    pub payout_id: Option<i64>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Commission
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Commission {
    id: i64,
    agent_id: i64,
    order_id: String,
    customer_ref: Option<String>,
    order_total: Money,
    rate: CommissionRate,
    amount: Money,
    status: CommissionStatus,
    tier_applied: Option<String>,
    breakdown: Vec<BreakdownItem>,
    /// Set while the commission is claimed by a pending/processing payout.
    payout_id: Option<i64>,
    cancel_reason: Option<String>,
    #[ts(as = "String")]
    created_at: DateTime<Utc>,
    #[ts(as = "String")]
    updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    approved_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    paid_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    cancelled_at: Option<DateTime<Utc>>,
}

impl Commission {
    /// Opens a pending commission.
    ///
    /// ## Rules
    /// - `agent_id` must be set, `order_id` non-empty, `order_total` > 0
    /// - an explicit `amount` must not be negative
    /// - without an explicit amount, `amount = rate × order_total`
    ///
    /// The commission has id 0 until the repository assigns one; call
    /// [`Commission::created_event`] after insert to get the `Created` event.
    pub fn create(new: NewCommission, now: DateTime<Utc>) -> CoreResult<Self> {
        validate_agent_id(new.agent_id)?;
        let order_id = validate_order_id(&new.order_id)?;
        validate_positive_amount("order_total", new.order_total)?;

        let amount = match new.amount {
            Some(amount) if amount.is_negative() => {
                return Err(ValidationError::MustNotBeNegative {
                    field: "amount".to_string(),
                }
                .into())
            }
            Some(amount) => amount,
            None => new.rate.calculate_commission(new.order_total),
        };

        Ok(Commission {
            id: 0,
            agent_id: new.agent_id,
            order_id,
            customer_ref: new.customer_ref.filter(|c| !c.trim().is_empty()),
            order_total: new.order_total,
            rate: new.rate,
            amount,
            status: CommissionStatus::Pending,
            tier_applied: new.tier_applied,
            breakdown: new.breakdown,
            payout_id: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            approved_at: None,
            paid_at: None,
            cancelled_at: None,
        })
    }

    /// Rebuilds a commission from storage without re-running creation rules.
    pub fn restore(parts: CommissionParts) -> Self {
        Commission {
            id: parts.id,
            agent_id: parts.agent_id,
            order_id: parts.order_id,
            customer_ref: parts.customer_ref,
            order_total: parts.order_total,
            rate: parts.rate,
            amount: parts.amount,
            status: parts.status,
            tier_applied: parts.tier_applied,
            breakdown: parts.breakdown,
            payout_id: parts.payout_id,
            cancel_reason: parts.cancel_reason,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            approved_at: parts.approved_at,
            paid_at: parts.paid_at,
            cancelled_at: parts.cancelled_at,
        }
    }

    /// Records the storage-assigned id.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn created_event(&self) -> CommissionEvent {
        CommissionEvent::Created {
            commission_id: self.id,
            agent_id: self.agent_id,
            order_id: self.order_id.clone(),
            amount: self.amount,
            occurred_at: self.created_at,
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// pending → approved.
    pub fn approve(&mut self, now: DateTime<Utc>) -> CoreResult<CommissionEvent> {
        if self.status != CommissionStatus::Pending {
            return Err(self.invalid_transition(CommissionStatus::Approved));
        }

        self.status = CommissionStatus::Approved;
        self.approved_at = Some(now);
        self.updated_at = now;

        Ok(CommissionEvent::Approved {
            commission_id: self.id,
            agent_id: self.agent_id,
            amount: self.amount,
            occurred_at: now,
        })
    }

    /// approved → paid.
    pub fn mark_as_paid(&mut self, now: DateTime<Utc>) -> CoreResult<CommissionEvent> {
        if self.status != CommissionStatus::Approved {
            return Err(CoreError::NotApproved {
                commission_id: self.id,
                status: self.status,
            });
        }

        self.status = CommissionStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;

        Ok(CommissionEvent::Paid {
            commission_id: self.id,
            agent_id: self.agent_id,
            amount: self.amount,
            occurred_at: now,
        })
    }

    /// pending/approved → cancelled.
    pub fn cancel(&mut self, reason: Option<String>, now: DateTime<Utc>) -> CoreResult<CommissionEvent> {
        if self.status.is_terminal() {
            return Err(CoreError::AlreadyTerminal {
                entity: "commission",
                id: self.id,
                status: self.status.to_string(),
            });
        }

        let reason = reason.filter(|r| !r.trim().is_empty());
        self.status = CommissionStatus::Cancelled;
        self.cancel_reason = reason.clone();
        self.cancelled_at = Some(now);
        self.updated_at = now;

        Ok(CommissionEvent::Cancelled {
            commission_id: self.id,
            agent_id: self.agent_id,
            reason,
            occurred_at: now,
        })
    }

    fn invalid_transition(&self, to: CommissionStatus) -> CoreError {
        CoreError::InvalidTransition {
            entity: "commission",
            id: self.id,
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn agent_id(&self) -> i64 {
        self.agent_id
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn customer_ref(&self) -> Option<&str> {
        self.customer_ref.as_deref()
    }

    pub fn order_total(&self) -> Money {
        self.order_total
    }

    pub fn rate(&self) -> CommissionRate {
        self.rate
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn status(&self) -> CommissionStatus {
        self.status
    }

    pub fn tier_applied(&self) -> Option<&str> {
        self.tier_applied.as_deref()
    }

    pub fn breakdown(&self) -> &[BreakdownItem] {
        &self.breakdown
    }

    pub fn payout_id(&self) -> Option<i64> {
        self.payout_id
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
    }

    fn pending(amount_major: i64, pct: f64) -> Commission {
        let new = NewCommission::new(
            7,
            "ORD-1001",
            Money::from_major_minor(amount_major, 0),
            CommissionRate::new(pct).unwrap(),
        );
        Commission::create(new, t0()).unwrap().with_id(1)
    }

    fn in_state(status: CommissionStatus) -> Commission {
        let mut c = pending(1000, 5.0);
        match status {
            CommissionStatus::Pending => {}
            CommissionStatus::Approved => {
                c.approve(t0()).unwrap();
            }
            CommissionStatus::Paid => {
                c.approve(t0()).unwrap();
                c.mark_as_paid(t0()).unwrap();
            }
            CommissionStatus::Cancelled => {
                c.cancel(None, t0()).unwrap();
            }
        }
        c
    }

    /// Runs the operation that targets `to`. No operation targets pending.
    fn attempt(c: &mut Commission, to: CommissionStatus) -> CoreResult<CommissionEvent> {
        let later = t0() + Duration::hours(1);
        match to {
            CommissionStatus::Pending => Err(CoreError::InvalidTransition {
                entity: "commission",
                id: c.id(),
                from: c.status().to_string(),
                to: to.to_string(),
            }),
            CommissionStatus::Approved => c.approve(later),
            CommissionStatus::Paid => c.mark_as_paid(later),
            CommissionStatus::Cancelled => c.cancel(Some("test".into()), later),
        }
    }

    #[test]
    fn test_create_derives_amount() {
        let c = pending(1000, 5.0);
        assert_eq!(c.amount(), Money::from_major_minor(50, 0));
        assert_eq!(c.status(), CommissionStatus::Pending);
        assert_eq!(c.created_at(), c.updated_at());
    }

    #[test]
    fn test_create_keeps_explicit_amount() {
        let mut new = NewCommission::new(7, "ORD-9", Money::from_cents(10_000), CommissionRate::DEFAULT);
        new.amount = Some(Money::from_cents(1_234));
        let c = Commission::create(new, t0()).unwrap();
        assert_eq!(c.amount().cents(), 1_234);
    }

    #[test]
    fn test_create_validation() {
        let rate = CommissionRate::DEFAULT;
        let ok_total = Money::from_cents(100);

        let missing_agent = NewCommission::new(0, "ORD-1", ok_total, rate);
        assert!(matches!(Commission::create(missing_agent, t0()), Err(CoreError::Validation(_))));

        let missing_order = NewCommission::new(1, "  ", ok_total, rate);
        assert!(matches!(Commission::create(missing_order, t0()), Err(CoreError::Validation(_))));

        let zero_total = NewCommission::new(1, "ORD-1", Money::zero(), rate);
        assert!(matches!(Commission::create(zero_total, t0()), Err(CoreError::Validation(_))));

        let mut negative = NewCommission::new(1, "ORD-1", ok_total, rate);
        negative.amount = Some(Money::from_cents(-1));
        assert!(matches!(Commission::create(negative, t0()), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_amount_is_frozen_at_creation() {
        let c = pending(1000, 5.0);
        // A later rate change produces a different number but the entity
        // has no way to pick it up.
        let new_rate = CommissionRate::new(20.0).unwrap();
        assert_ne!(new_rate.calculate_commission(c.order_total()), c.amount());

        let mut c = c;
        c.approve(t0()).unwrap();
        c.mark_as_paid(t0()).unwrap();
        assert_eq!(c.amount(), Money::from_major_minor(50, 0));
    }

    #[test]
    fn test_every_transition_pair() {
        use CommissionStatus::*;
        let allowed = [(Pending, Approved), (Pending, Cancelled), (Approved, Paid), (Approved, Cancelled)];

        for from in CommissionStatus::ALL {
            for to in CommissionStatus::ALL {
                let mut c = in_state(from);
                let before = c.clone();
                let result = attempt(&mut c, to);

                if allowed.contains(&(from, to)) {
                    assert!(result.is_ok(), "{from} -> {to} should succeed");
                    assert_eq!(c.status(), to);
                    assert!(c.updated_at() > before.updated_at());
                } else {
                    assert!(result.is_err(), "{from} -> {to} should fail");
                    assert_eq!(c, before, "{from} -> {to} must leave entity unchanged");
                }
            }
        }
    }

    #[test]
    fn test_error_variants_per_operation() {
        let mut approved = in_state(CommissionStatus::Approved);
        assert!(matches!(approved.approve(t0()), Err(CoreError::InvalidTransition { .. })));

        let mut fresh = in_state(CommissionStatus::Pending);
        assert!(matches!(fresh.mark_as_paid(t0()), Err(CoreError::NotApproved { .. })));

        let mut paid = in_state(CommissionStatus::Paid);
        assert!(matches!(paid.cancel(None, t0()), Err(CoreError::AlreadyTerminal { .. })));
    }

    #[test]
    fn test_events_carry_identity_and_amount() {
        let mut c = pending(1000, 5.0);
        assert_eq!(c.created_event().event_type(), "commission.created");

        let approved = c.approve(t0()).unwrap();
        assert_eq!(
            approved,
            CommissionEvent::Approved {
                commission_id: 1,
                agent_id: 7,
                amount: Money::from_major_minor(50, 0),
                occurred_at: t0(),
            }
        );

        let paid = c.mark_as_paid(t0()).unwrap();
        assert_eq!(paid.event_type(), "commission.paid");
        assert_eq!(c.paid_at(), Some(t0()));
    }

    #[test]
    fn test_cancel_records_reason() {
        let mut c = pending(200, 10.0);
        let event = c.cancel(Some("order refunded".into()), t0()).unwrap();
        assert_eq!(c.cancel_reason(), Some("order refunded"));
        assert!(matches!(event, CommissionEvent::Cancelled { reason: Some(_), .. }));
    }

    #[test]
    fn test_event_json_is_tagged() {
        let c = pending(100, 10.0);
        let json = serde_json::to_value(c.created_event()).unwrap();
        assert_eq!(json["type"], "created");
        assert_eq!(json["amount"], 1000);
    }
}
