//! # Event Outbox Repository
//!
//! Lifecycle events waiting to be published.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LEDGER OPERATION (e.g., approve_commission)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE commissions SET status = 'approved' WHERE id = ?    │   │
//! │  │  2. UPDATE agents SET total_earned_cents = ? WHERE id = ?      │   │
//! │  │  3. INSERT INTO event_outbox (aggregate_type, event_type, ...)  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← the event exists exactly when the state change does          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  RELAY (outside this crate)                                            │
//! │    pending(n) → publish → mark_published(id)                           │
//! │                        └─ on error: mark_failed(id, err)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use agent_core::{AgentEvent, CommissionEvent, PayoutEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

// =============================================================================
// Event Trait
// =============================================================================

/// A domain event that can be written to the outbox.
pub trait OutboxEvent: Serialize {
    /// `"agent"`, `"commission"` or `"payout"`.
    fn aggregate_type(&self) -> &'static str;

    fn aggregate_id(&self) -> i64;

    /// Dotted name such as `commission.approved`.
    fn event_type(&self) -> &'static str;
}

impl OutboxEvent for CommissionEvent {
    fn aggregate_type(&self) -> &'static str {
        "commission"
    }

    fn aggregate_id(&self) -> i64 {
        self.commission_id()
    }

    fn event_type(&self) -> &'static str {
        CommissionEvent::event_type(self)
    }
}

impl OutboxEvent for PayoutEvent {
    fn aggregate_type(&self) -> &'static str {
        "payout"
    }

    fn aggregate_id(&self) -> i64 {
        self.payout_id
    }

    fn event_type(&self) -> &'static str {
        PayoutEvent::event_type(self)
    }
}

impl OutboxEvent for AgentEvent {
    fn aggregate_type(&self) -> &'static str {
        "agent"
    }

    fn aggregate_id(&self) -> i64 {
        self.agent_id()
    }

    fn event_type(&self) -> &'static str {
        AgentEvent::event_type(self)
    }
}

// =============================================================================
// Entry
// =============================================================================

/// One stored outbox row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OutboxEntry {
    pub id: String,
    pub aggregate_type: String,
    pub aggregate_id: i64,
    pub event_type: String,
    /// JSON of the event.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Parses the payload back into a typed event.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> DbResult<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

const SELECT_ENTRY: &str = r#"
    SELECT id, aggregate_type, aggregate_id, event_type, payload, attempts,
           last_error, created_at, attempted_at, published_at
    FROM event_outbox
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for draining the outbox.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Unpublished entries, oldest first.
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let sql = format!(
            "{} WHERE published_at IS NULL ORDER BY created_at ASC, rowid ASC LIMIT ?1",
            SELECT_ENTRY
        );
        let entries: Vec<OutboxEntry> = sqlx::query_as(&sql)
            .bind(super::page_limit(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// All entries of one aggregate in write order.
    pub async fn for_aggregate(&self, aggregate_type: &str, aggregate_id: i64) -> DbResult<Vec<OutboxEntry>> {
        let sql = format!(
            "{} WHERE aggregate_type = ?1 AND aggregate_id = ?2 ORDER BY created_at ASC, rowid ASC",
            SELECT_ENTRY
        );
        let entries: Vec<OutboxEntry> = sqlx::query_as(&sql)
            .bind(aggregate_type)
            .bind(aggregate_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    pub async fn mark_published(&self, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE event_outbox SET
                published_at = ?2,
                attempted_at = ?2,
                attempts = attempts + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OutboxEntry", id));
        }
        Ok(())
    }

    /// Records a failed publish attempt. The entry stays pending.
    pub async fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> DbResult<()> {
        warn!(id = %id, error = %error, "Outbox publish failed");

        let result = sqlx::query(
            r#"
            UPDATE event_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OutboxEntry", id));
        }
        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_outbox WHERE published_at IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Deletes published entries older than `before`. Returns how many.
    pub async fn cleanup_published(&self, before: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM event_outbox WHERE published_at IS NOT NULL AND published_at < ?1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        debug!(deleted = result.rows_affected(), "Outbox cleanup");
        Ok(result.rows_affected())
    }
}

/// Writes an event row on the caller's connection, usually inside the
/// transaction that produced the event.
pub(crate) async fn append<E: OutboxEvent>(
    conn: &mut SqliteConnection,
    event: &E,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let payload = serde_json::to_string(event)?;

    debug!(
        aggregate_type = event.aggregate_type(),
        aggregate_id = event.aggregate_id(),
        event_type = event.event_type(),
        "Appending outbox event"
    );

    sqlx::query(
        r#"
        INSERT INTO event_outbox (id, aggregate_type, aggregate_id, event_type, payload, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(event.aggregate_type())
    .bind(event.aggregate_id())
    .bind(event.event_type())
    .bind(payload)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
