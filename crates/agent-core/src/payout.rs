//! # Payout Aggregate
//!
//! A payout settles one agent's approved commissions for one period.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Payout #42  agent 7  period 2026-03                 status: pending   │
//! │  ─────────────────────────────────────────────────────────────────────  │
//! │   commission 11   ORD-1001   50.00                                      │
//! │   commission 12   ORD-1002   75.00                                      │
//! │   commission 15   ORD-1009   25.00                                      │
//! │  ─────────────────────────────────────────────────────────────────────  │
//! │   amount                     150.00   (fixed at construction)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The item list and the amount are decided once. No method adds, removes
//! or re-prices an item after construction.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::commission::Commission;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::status::PayoutStatus;
use crate::validation::{validate_agent_id, validate_non_negative_amount};

// =============================================================================
// Payout Period
// =============================================================================

/// A calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PayoutPeriod {
    year: i32,
    month: u32,
}

impl PayoutPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, ValidationError> {
        if !(1..=12).contains(&month) || !(1970..=9999).contains(&year) {
            return Err(period_format_error());
        }
        Ok(PayoutPeriod { year, month })
    }

    /// The month containing `now`.
    pub fn current(now: DateTime<Utc>) -> Self {
        PayoutPeriod {
            year: now.year(),
            month: now.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First instant of the month.
    pub fn start(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
    }

    /// First instant of the following month (exclusive bound).
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start() && instant < self.end()
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            PayoutPeriod { year: self.year + 1, month: 1 }
        } else {
            PayoutPeriod { year: self.year, month: self.month + 1 }
        }
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            PayoutPeriod { year: self.year - 1, month: 12 }
        } else {
            PayoutPeriod { year: self.year, month: self.month - 1 }
        }
    }
}

fn period_format_error() -> ValidationError {
    ValidationError::InvalidFormat {
        field: "period".to_string(),
        reason: "expected YYYY-MM".to_string(),
    }
}

impl fmt::Display for PayoutPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PayoutPeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::required("period"));
        }
        let (year, month) = s.split_once('-').ok_or_else(period_format_error)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(period_format_error());
        }
        let year: i32 = year.parse().map_err(|_| period_format_error())?;
        let month: u32 = month.parse().map_err(|_| period_format_error())?;
        PayoutPeriod::new(year, month)
    }
}

impl TryFrom<String> for PayoutPeriod {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PayoutPeriod> for String {
    fn from(period: PayoutPeriod) -> Self {
        period.to_string()
    }
}

// =============================================================================
// Payout Item
// =============================================================================

/// One commission inside a payout. Two items are equal when they refer to
/// the same commission.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PayoutItem {
    pub commission_id: i64,
    pub order_id: String,
    pub amount: Money,
}

impl PayoutItem {
    pub fn new(commission_id: i64, order_id: impl Into<String>, amount: Money) -> Self {
        PayoutItem {
            commission_id,
            order_id: order_id.into(),
            amount,
        }
    }
}

impl PartialEq for PayoutItem {
    fn eq(&self, other: &Self) -> bool {
        self.commission_id == other.commission_id
    }
}

impl Eq for PayoutItem {}

impl From<&Commission> for PayoutItem {
    fn from(c: &Commission) -> Self {
        PayoutItem::new(c.id(), c.order_id(), c.amount())
    }
}

// =============================================================================
// Events
// =============================================================================

/// Emitted by every payout transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PayoutEvent {
    pub payout_id: i64,
    pub agent_id: i64,
    pub status: PayoutStatus,
    pub amount: Money,
    pub reason: Option<String>,
    #[ts(as = "String")]
    pub occurred_at: DateTime<Utc>,
}

impl PayoutEvent {
    pub fn event_type(&self) -> &'static str {
        match self.status {
            PayoutStatus::Pending => "payout.pending",
            PayoutStatus::Processing => "payout.processing",
            PayoutStatus::Completed => "payout.completed",
            PayoutStatus::Failed => "payout.failed",
            PayoutStatus::Cancelled => "payout.cancelled",
        }
    }
}

// =============================================================================
// Storage Parts
// =============================================================================

#[derive(Debug, Clone)]
pub struct PayoutParts {
    pub id: i64,
    pub agent_id: i64,
    pub period: PayoutPeriod,
    pub amount: Money,
    pub items: Vec<PayoutItem>,
    pub status: PayoutStatus,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Payout
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Payout {
    id: i64,
    agent_id: i64,
    #[ts(as = "String")]
    period: PayoutPeriod,
    amount: Money,
    items: Vec<PayoutItem>,
    status: PayoutStatus,
    failure_reason: Option<String>,
    #[ts(as = "Option<String>")]
    paid_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    created_at: DateTime<Utc>,
    #[ts(as = "String")]
    updated_at: DateTime<Utc>,
}

impl Payout {
    /// Builds a pending payout over `items`.
    ///
    /// ## Rules
    /// - `agent_id` must be set
    /// - `items` must be non-empty (`NoCommissions` otherwise)
    /// - no commission may appear twice, no item amount may be negative
    /// - `amount` is the sum of the item amounts
    pub fn new(
        agent_id: i64,
        period: PayoutPeriod,
        items: Vec<PayoutItem>,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        validate_agent_id(agent_id)?;

        if items.is_empty() {
            return Err(CoreError::NoCommissions {
                agent_id,
                period: period.to_string(),
            });
        }

        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            validate_non_negative_amount("item amount", item.amount)?;
            if !seen.insert(item.commission_id) {
                return Err(ValidationError::InvalidFormat {
                    field: "items".to_string(),
                    reason: format!("commission {} listed twice", item.commission_id),
                }
                .into());
            }
        }

        let amount = items.iter().map(|i| i.amount).sum();

        Ok(Payout {
            id: 0,
            agent_id,
            period,
            amount,
            items,
            status: PayoutStatus::Pending,
            failure_reason: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Builds a payout from commissions, checking each belongs to the agent
    /// and is approved.
    pub fn from_commissions(
        agent_id: i64,
        period: PayoutPeriod,
        commissions: &[Commission],
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        for c in commissions {
            if c.agent_id() != agent_id {
                return Err(ValidationError::InvalidFormat {
                    field: "commissions".to_string(),
                    reason: format!("commission {} belongs to agent {}", c.id(), c.agent_id()),
                }
                .into());
            }
            if !c.status().is_payable() {
                return Err(CoreError::NotApproved {
                    commission_id: c.id(),
                    status: c.status(),
                });
            }
        }

        let items = commissions.iter().map(PayoutItem::from).collect();
        Payout::new(agent_id, period, items, now)
    }

    pub fn restore(parts: PayoutParts) -> Self {
        Payout {
            id: parts.id,
            agent_id: parts.agent_id,
            period: parts.period,
            amount: parts.amount,
            items: parts.items,
            status: parts.status,
            failure_reason: parts.failure_reason,
            paid_at: parts.paid_at,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn created_event(&self) -> PayoutEvent {
        self.event(None, self.created_at)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// pending → processing.
    pub fn process(&mut self, now: DateTime<Utc>) -> CoreResult<PayoutEvent> {
        self.transition(PayoutStatus::Processing, now)?;
        Ok(self.event(None, now))
    }

    /// processing → completed. Stamps `paid_at`.
    pub fn complete(&mut self, now: DateTime<Utc>) -> CoreResult<PayoutEvent> {
        self.transition(PayoutStatus::Completed, now)?;
        self.paid_at = Some(now);
        Ok(self.event(None, now))
    }

    /// processing → failed.
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> CoreResult<PayoutEvent> {
        self.transition(PayoutStatus::Failed, now)?;
        let reason = reason.into();
        self.failure_reason = if reason.trim().is_empty() { None } else { Some(reason) };
        Ok(self.event(self.failure_reason.clone(), now))
    }

    /// failed → pending.
    pub fn retry(&mut self, now: DateTime<Utc>) -> CoreResult<PayoutEvent> {
        self.transition(PayoutStatus::Pending, now)?;
        self.failure_reason = None;
        Ok(self.event(None, now))
    }

    /// pending → cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> CoreResult<PayoutEvent> {
        if self.status.is_terminal() {
            return Err(CoreError::AlreadyTerminal {
                entity: "payout",
                id: self.id,
                status: self.status.to_string(),
            });
        }
        self.transition(PayoutStatus::Cancelled, now)?;
        Ok(self.event(None, now))
    }

    fn transition(&mut self, to: PayoutStatus, now: DateTime<Utc>) -> CoreResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                entity: "payout",
                id: self.id,
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    fn event(&self, reason: Option<String>, now: DateTime<Utc>) -> PayoutEvent {
        PayoutEvent {
            payout_id: self.id,
            agent_id: self.agent_id,
            status: self.status,
            amount: self.amount,
            reason,
            occurred_at: now,
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

    pub fn period(&self) -> PayoutPeriod {
        self.period
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn items(&self) -> &[PayoutItem] {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn commission_ids(&self) -> Vec<i64> {
        self.items.iter().map(|i| i.commission_id).collect()
    }

    pub fn status(&self) -> PayoutStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
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
