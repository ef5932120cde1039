//! # Error Types
//!
//! Domain errors for agent-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  agent-core errors (this file)                                          │
//! │  ├── CoreError        - Domain rule violations                          │
//! │  └── ValidationError  - Malformed input, rejected before any change     │
//! │                                                                         │
//! │  agent-db errors (separate crate)                                       │
//! │  └── DbError          - Storage failures, wraps CoreError               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant maps to one [`ErrorKind`] so outer layers can turn errors
//! into responses without matching each variant.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::status::{AgentStatus, CommissionStatus};

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification of a domain failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input. Nothing was changed.
    Validation,
    /// The entity is not in a state that allows the operation. Entity unchanged.
    StateTransition,
    /// The agent may not earn commission right now.
    NotEligible,
    /// A referenced agent, commission, payout or team does not exist.
    NotFound,
}

// =============================================================================
// Core Error
// =============================================================================

#[derive(Debug, Error)]
pub enum CoreError {
    /// Status change not in the entity's transition table.
    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: i64,
        from: String,
        to: String,
    },

    /// `mark_as_paid` on a commission that is not approved.
    #[error("Commission {commission_id} is {status}, only approved commissions can be paid")]
    NotApproved {
        commission_id: i64,
        status: CommissionStatus,
    },

    /// The entity already reached paid/completed/cancelled.
    #[error("{entity} {id} is already {status}")]
    AlreadyTerminal {
        entity: &'static str,
        id: i64,
        status: String,
    },

    /// Commission calculation refused for a non-active agent.
    ///
    /// ## When This Occurs
    /// ```text
    /// Order completed for agent 7
    ///      │
    ///      ▼
    /// agent.status = suspended
    ///      │
    ///      ▼
    /// AgentNotEligible { agent_id: 7, status: Suspended }
    /// ```
    #[error("Agent {agent_id} is {status} and cannot earn commission")]
    AgentNotEligible { agent_id: i64, status: AgentStatus },

    /// A payout was requested but no approved commission qualifies.
    #[error("No approved commissions for agent {agent_id} in period {period}")]
    NoCommissions { agent_id: i64, period: String },

    #[error("Agent {agent_id} is already at the highest tier")]
    AlreadyTopTier { agent_id: i64 },

    #[error("Agent not found: {0}")]
    AgentNotFound(i64),

    #[error("Commission not found: {0}")]
    CommissionNotFound(i64),

    #[error("Payout not found: {0}")]
    PayoutNotFound(i64),

    #[error("Team not found: {0}")]
    TeamNotFound(i64),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::InvalidTransition { .. }
            | CoreError::NotApproved { .. }
            | CoreError::AlreadyTerminal { .. }
            | CoreError::AlreadyTopTier { .. } => ErrorKind::StateTransition,
            // An empty batch is a request the current ledger state cannot satisfy.
            CoreError::NoCommissions { .. } => ErrorKind::StateTransition,
            CoreError::AgentNotEligible { .. } => ErrorKind::NotEligible,
            CoreError::AgentNotFound(_)
            | CoreError::CommissionNotFound(_)
            | CoreError::PayoutNotFound(_)
            | CoreError::TeamNotFound(_) => ErrorKind::NotFound,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}, got {value}")]
    InvalidRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Two volume tiers cover the same subtotal.
    #[error("volume tiers overlap: {first} and {second}")]
    OverlappingTiers { first: String, second: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required { field: field.into() }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::NotApproved {
            commission_id: 12,
            status: CommissionStatus::Pending,
        };
        assert_eq!(
            err.to_string(),
            "Commission 12 is pending, only approved commissions can be paid"
        );

        let err = CoreError::AlreadyTerminal {
            entity: "commission",
            id: 3,
            status: "paid".to_string(),
        };
        assert_eq!(err.to_string(), "commission 3 is already paid");
    }

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(
            ValidationError::required("order_id").to_string(),
            "order_id is required"
        );

        let err = ValidationError::InvalidRange {
            field: "commission_rate".to_string(),
            value: 120.0,
            min: 0.0,
            max: 100.0,
        };
        assert_eq!(err.to_string(), "commission_rate must be between 0 and 100, got 120");
    }

    #[test]
    fn test_kind_classification() {
        let validation: CoreError = ValidationError::required("agent_id").into();
        assert_eq!(validation.kind(), ErrorKind::Validation);

        let transition = CoreError::InvalidTransition {
            entity: "payout",
            id: 1,
            from: "pending".to_string(),
            to: "completed".to_string(),
        };
        assert_eq!(transition.kind(), ErrorKind::StateTransition);

        let not_eligible = CoreError::AgentNotEligible {
            agent_id: 1,
            status: AgentStatus::Suspended,
        };
        assert_eq!(not_eligible.kind(), ErrorKind::NotEligible);
        assert_eq!(CoreError::PayoutNotFound(9).kind(), ErrorKind::NotFound);
    }
}
