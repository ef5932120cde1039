//! # Repository Module
//!
//! Database repository implementations for the commission ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Caller                                                                 │
//! │       │  db.commissions().list_by_agent(7, CommissionFilter::default())│
//! │       ▼                                                                 │
//! │  CommissionRepository          (pool-backed reads and single writes)   │
//! │       │                                                                 │
//! │       │  connection-level helpers (fetch / insert / save)              │
//! │       │  shared with the ledger so a transaction can reuse them        │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Rows are read into `*Row` structs (sqlx::FromRow) and converted into  │
//! │  agent-core entities with `TryFrom`, so a bad stored value surfaces as │
//! │  DbError::InvalidData instead of a panic.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`AgentRepository`] - Agent lookup, listing and updates
//! - [`TeamRepository`] - Team CRUD and membership
//! - [`CommissionRepository`] - Commission lookup and listings
//! - [`PayoutRepository`] - Payouts and their items
//! - [`BonusRepository`] - Product/category bonus tables, per-agent category rates
//! - [`TierRepository`] - Per-agent volume tiers
//! - [`OutboxRepository`] - Lifecycle event outbox
//! - [`ReportRepository`] - Dashboard, monthly performance and stats

pub mod agent;
pub mod bonus;
pub mod commission;
pub mod outbox;
pub mod payout;
pub mod report;
pub mod team;
pub mod tier;

pub use agent::AgentRepository;
pub use bonus::BonusRepository;
pub use commission::{CommissionFilter, CommissionRepository};
pub use outbox::{OutboxEntry, OutboxEvent, OutboxRepository};
pub use payout::PayoutRepository;
pub use report::ReportRepository;
pub use team::TeamRepository;
pub use tier::TierRepository;

use agent_core::{CommissionRate, Money};

use crate::error::{DbError, DbResult};

// =============================================================================
// Column Conversions
// =============================================================================

/// Rates are stored as basis points.
pub(crate) fn rate_to_bps(rate: CommissionRate) -> i64 {
    i64::from(rate.bps())
}

pub(crate) fn rate_from_bps(column: &str, bps: i64) -> DbResult<CommissionRate> {
    u32::try_from(bps)
        .ok()
        .and_then(|bps| CommissionRate::from_bps(bps).ok())
        .ok_or_else(|| DbError::invalid_data(format!("{} out of range: {}", column, bps)))
}

pub(crate) fn money(cents: i64) -> Money {
    Money::from_cents(cents)
}

/// Bounds a caller-supplied page size.
pub(crate) fn page_limit(limit: u32) -> i64 {
    i64::from(limit.clamp(1, 500))
}
