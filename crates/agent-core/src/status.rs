//! # Status Machines
//!
//! Closed status enums for agents, commissions and payouts. Storage keeps
//! them as lowercase strings; everything inside the crate works with the
//! enum, and a row carrying an unknown status fails to load.
//!
//! ## Commission
//! ```text
//!   pending ──approve──► approved ──mark_as_paid──► paid (terminal)
//!      │                    │
//!      └──────cancel────────┴──────────────────────► cancelled (terminal)
//! ```
//!
//! ## Payout
//! ```text
//!   pending ──process──► processing ──complete──► completed (terminal)
//!    ▲  │                    │
//!    │  └──cancel──► cancelled (terminal)
//!    │                       │
//!    └──────retry──── failed ◄──fail
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

fn not_allowed(field: &str, allowed: &[&str]) -> ValidationError {
    ValidationError::NotAllowed {
        field: field.to_string(),
        allowed: allowed.iter().map(|s| s.to_string()).collect(),
    }
}

// =============================================================================
// Agent Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Inactive,
    Suspended,
    Pending,
}

impl AgentStatus {
    pub const ALL: [AgentStatus; 4] = [
        AgentStatus::Active,
        AgentStatus::Inactive,
        AgentStatus::Suspended,
        AgentStatus::Pending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Inactive => "inactive",
            AgentStatus::Suspended => "suspended",
            AgentStatus::Pending => "pending",
        }
    }

    /// Only active agents accrue commission.
    #[inline]
    pub fn can_earn_commission(&self) -> bool {
        *self == AgentStatus::Active
    }

    #[inline]
    pub fn can_receive_payout(&self) -> bool {
        *self == AgentStatus::Active
    }

    #[inline]
    pub fn can_be_activated(&self) -> bool {
        matches!(self, AgentStatus::Inactive | AgentStatus::Pending)
    }
}

impl Default for AgentStatus {
    fn default() -> Self {
        AgentStatus::Active
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(AgentStatus::Active),
            "inactive" => Ok(AgentStatus::Inactive),
            "suspended" => Ok(AgentStatus::Suspended),
            "pending" => Ok(AgentStatus::Pending),
            _ => Err(not_allowed(
                "agent_status",
                &["active", "inactive", "suspended", "pending"],
            )),
        }
    }
}

// =============================================================================
// Commission Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Paid,
    Cancelled,
}

impl CommissionStatus {
    pub const ALL: [CommissionStatus; 4] = [
        CommissionStatus::Pending,
        CommissionStatus::Approved,
        CommissionStatus::Paid,
        CommissionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Approved => "approved",
            CommissionStatus::Paid => "paid",
            CommissionStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses reachable in one step from `self`.
    pub fn allowed_transitions(&self) -> &'static [CommissionStatus] {
        match self {
            CommissionStatus::Pending => &[CommissionStatus::Approved, CommissionStatus::Cancelled],
            CommissionStatus::Approved => &[CommissionStatus::Paid, CommissionStatus::Cancelled],
            CommissionStatus::Paid | CommissionStatus::Cancelled => &[],
        }
    }

    #[inline]
    pub fn can_transition_to(&self, target: CommissionStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Approved commissions are the only ones a payout may include.
    #[inline]
    pub fn is_payable(&self) -> bool {
        *self == CommissionStatus::Approved
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommissionStatus::Paid | CommissionStatus::Cancelled)
    }
}

impl Default for CommissionStatus {
    fn default() -> Self {
        CommissionStatus::Pending
    }
}

impl fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommissionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(CommissionStatus::Pending),
            "approved" => Ok(CommissionStatus::Approved),
            "paid" => Ok(CommissionStatus::Paid),
            "cancelled" => Ok(CommissionStatus::Cancelled),
            _ => Err(not_allowed(
                "commission_status",
                &["pending", "approved", "paid", "cancelled"],
            )),
        }
    }
}

// =============================================================================
// Payout Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PayoutStatus {
    pub const ALL: [PayoutStatus; 5] = [
        PayoutStatus::Pending,
        PayoutStatus::Processing,
        PayoutStatus::Completed,
        PayoutStatus::Failed,
        PayoutStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
            PayoutStatus::Cancelled => "cancelled",
        }
    }

    pub fn allowed_transitions(&self) -> &'static [PayoutStatus] {
        match self {
            PayoutStatus::Pending => &[PayoutStatus::Processing, PayoutStatus::Cancelled],
            PayoutStatus::Processing => &[PayoutStatus::Completed, PayoutStatus::Failed],
            PayoutStatus::Failed => &[PayoutStatus::Pending],
            PayoutStatus::Completed | PayoutStatus::Cancelled => &[],
        }
    }

    #[inline]
    pub fn can_transition_to(&self, target: PayoutStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    #[inline]
    pub fn can_retry(&self) -> bool {
        *self == PayoutStatus::Failed
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Completed | PayoutStatus::Cancelled)
    }

    /// Pending or processing: the payout still holds its commissions.
    #[inline]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, PayoutStatus::Pending | PayoutStatus::Processing)
    }
}

impl Default for PayoutStatus {
    fn default() -> Self {
        PayoutStatus::Pending
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(PayoutStatus::Pending),
            "processing" => Ok(PayoutStatus::Processing),
            "completed" => Ok(PayoutStatus::Completed),
            "failed" => Ok(PayoutStatus::Failed),
            "cancelled" => Ok(PayoutStatus::Cancelled),
            _ => Err(not_allowed(
                "payout_status",
                &["pending", "processing", "completed", "failed", "cancelled"],
            )),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
