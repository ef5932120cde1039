//! # Commission Repository
//!
//! Commission rows and their payout claims.
//!
//! ## Claims
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  commissions.payout_id                                                  │
//! │                                                                         │
//! │  NULL        free: may be picked up by the next payout                 │
//! │  <payout>    claimed by a pending / processing / failed payout         │
//! │                                                                         │
//! │  claim():    UPDATE ... SET payout_id = ?                              │
//! │              WHERE id = ? AND status = 'approved' AND payout_id IS NULL│
//! │              rows_affected == 1 → claimed, 0 → someone else has it     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The amount column is written once on insert and never updated.

use agent_core::{BreakdownItem, Commission, CommissionParts, CommissionStatus, CoreError};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{money, page_limit, rate_from_bps, rate_to_bps};
use crate::error::{DbError, DbResult};

const SELECT_COMMISSION: &str = r#"
    SELECT id, agent_id, order_id, customer_ref, order_total_cents, rate_bps, amount_cents,
           status, tier_applied, breakdown, payout_id, cancel_reason,
           created_at, updated_at, approved_at, paid_at, cancelled_at
    FROM commissions
"#;

#[derive(Debug, sqlx::FromRow)]
struct CommissionRow {
    id: i64,
    agent_id: i64,
    order_id: String,
    customer_ref: Option<String>,
    order_total_cents: i64,
    rate_bps: i64,
    amount_cents: i64,
    status: CommissionStatus,
    tier_applied: Option<String>,
    breakdown: String,
    payout_id: Option<i64>,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<CommissionRow> for Commission {
    type Error = DbError;

    fn try_from(row: CommissionRow) -> DbResult<Self> {
        let breakdown: Vec<BreakdownItem> = serde_json::from_str(&row.breakdown)
            .map_err(|e| DbError::invalid_data(format!("commission {} breakdown: {}", row.id, e)))?;

        Ok(Commission::restore(CommissionParts {
            id: row.id,
            agent_id: row.agent_id,
            order_id: row.order_id,
            customer_ref: row.customer_ref,
            order_total: money(row.order_total_cents),
            rate: rate_from_bps("commissions.rate_bps", row.rate_bps)?,
            amount: money(row.amount_cents),
            status: row.status,
            tier_applied: row.tier_applied,
            breakdown,
            payout_id: row.payout_id,
            cancel_reason: row.cancel_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            approved_at: row.approved_at,
            paid_at: row.paid_at,
            cancelled_at: row.cancelled_at,
        }))
    }
}

/// Listing options for an agent's commissions.
#[derive(Debug, Clone, Copy)]
pub struct CommissionFilter {
    pub status: Option<CommissionStatus>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for CommissionFilter {
    fn default() -> Self {
        CommissionFilter {
            status: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl CommissionFilter {
    pub fn status(status: CommissionStatus) -> Self {
        CommissionFilter {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Repository for commission reads.
///
/// State changes go through [`crate::ledger::Ledger`] so that the agent's
/// earnings, payout claims and the outbox move together.
#[derive(Debug, Clone)]
pub struct CommissionRepository {
    pool: SqlitePool,
}

impl CommissionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CommissionRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Commission>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Gets a commission by ID, failing with `CommissionNotFound` when absent.
    pub async fn get(&self, id: i64) -> DbResult<Commission> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::CommissionNotFound(id).into())
    }

    pub async fn get_by_order_id(&self, order_id: &str) -> DbResult<Option<Commission>> {
        let sql = format!("{} WHERE order_id = ?1", SELECT_COMMISSION);
        let row: Option<CommissionRow> = sqlx::query_as(&sql)
            .bind(order_id.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Commission::try_from).transpose()
    }

    /// An agent's commissions, newest first.
    pub async fn list_by_agent(&self, agent_id: i64, filter: CommissionFilter) -> DbResult<Vec<Commission>> {
        debug!(agent_id, status = ?filter.status, "Listing commissions");

        let sql = format!(
            "{} WHERE agent_id = ?1 AND (?2 IS NULL OR status = ?2) \
             ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
            SELECT_COMMISSION
        );
        let rows: Vec<CommissionRow> = sqlx::query_as(&sql)
            .bind(agent_id)
            .bind(filter.status)
            .bind(page_limit(filter.limit))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Commission::try_from).collect()
    }

    /// Pending commissions across all agents, oldest first (the approval queue).
    pub async fn list_pending(&self, limit: u32) -> DbResult<Vec<Commission>> {
        let sql = format!(
            "{} WHERE status = 'pending' ORDER BY created_at ASC, id ASC LIMIT ?1",
            SELECT_COMMISSION
        );
        let rows: Vec<CommissionRow> = sqlx::query_as(&sql)
            .bind(page_limit(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Commission::try_from).collect()
    }

    /// Commissions currently claimed by a payout.
    pub async fn list_claimed_by(&self, payout_id: i64) -> DbResult<Vec<Commission>> {
        let sql = format!("{} WHERE payout_id = ?1 ORDER BY id", SELECT_COMMISSION);
        let rows: Vec<CommissionRow> = sqlx::query_as(&sql)
            .bind(payout_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Commission::try_from).collect()
    }

    pub async fn count_by_agent(&self, agent_id: i64, status: Option<CommissionStatus>) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM commissions WHERE agent_id = ?1 AND (?2 IS NULL OR status = ?2)",
        )
        .bind(agent_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

// =============================================================================
// Connection-level helpers (shared with the ledger)
// =============================================================================

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Commission>> {
    let sql = format!("{} WHERE id = ?1", SELECT_COMMISSION);
    let row: Option<CommissionRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.map(Commission::try_from).transpose()
}

pub(crate) async fn fetch_required(conn: &mut SqliteConnection, id: i64) -> DbResult<Commission> {
    fetch(conn, id)
        .await?
        .ok_or_else(|| CoreError::CommissionNotFound(id).into())
}

/// Inserts a new commission and returns it with its id.
pub(crate) async fn insert(conn: &mut SqliteConnection, commission: Commission) -> DbResult<Commission> {
    let breakdown = serde_json::to_string(commission.breakdown())?;

    let result = sqlx::query(
        r#"
        INSERT INTO commissions (
            agent_id, order_id, customer_ref, order_total_cents, rate_bps, amount_cents,
            status, tier_applied, breakdown, payout_id, cancel_reason,
            created_at, updated_at, approved_at, paid_at, cancelled_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
    )
    .bind(commission.agent_id())
    .bind(commission.order_id())
    .bind(commission.customer_ref())
    .bind(commission.order_total().cents())
    .bind(rate_to_bps(commission.rate()))
    .bind(commission.amount().cents())
    .bind(commission.status())
    .bind(commission.tier_applied())
    .bind(&breakdown)
    .bind(commission.payout_id())
    .bind(commission.cancel_reason())
    .bind(commission.created_at())
    .bind(commission.updated_at())
    .bind(commission.approved_at())
    .bind(commission.paid_at())
    .bind(commission.cancelled_at())
    .execute(&mut *conn)
    .await
    .map_err(|err| match DbError::from(err) {
        DbError::UniqueViolation { field, .. } => DbError::duplicate(field, commission.order_id()),
        other => other,
    })?;

    Ok(commission.with_id(result.last_insert_rowid()))
}

/// Writes the lifecycle columns. Amount, rate and order data are immutable.
pub(crate) async fn save(conn: &mut SqliteConnection, commission: &Commission) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE commissions SET
            status = ?2,
            payout_id = ?3,
            cancel_reason = ?4,
            updated_at = ?5,
            approved_at = ?6,
            paid_at = ?7,
            cancelled_at = ?8
        WHERE id = ?1
        "#,
    )
    .bind(commission.id())
    .bind(commission.status())
    .bind(commission.payout_id())
    .bind(commission.cancel_reason())
    .bind(commission.updated_at())
    .bind(commission.approved_at())
    .bind(commission.paid_at())
    .bind(commission.cancelled_at())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::CommissionNotFound(commission.id()).into());
    }
    Ok(())
}

/// Approved commissions of an agent that no payout holds, oldest first.
pub(crate) async fn list_claimable(conn: &mut SqliteConnection, agent_id: i64) -> DbResult<Vec<Commission>> {
    let sql = format!(
        "{} WHERE agent_id = ?1 AND status = 'approved' AND payout_id IS NULL \
         ORDER BY created_at ASC, id ASC",
        SELECT_COMMISSION
    );
    let rows: Vec<CommissionRow> = sqlx::query_as(&sql).bind(agent_id).fetch_all(&mut *conn).await?;
    rows.into_iter().map(Commission::try_from).collect()
}

/// Claims one commission for a payout. Returns false when it is no longer
/// approved or another payout already holds it.
pub(crate) async fn claim(
    conn: &mut SqliteConnection,
    commission_id: i64,
    payout_id: i64,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE commissions SET payout_id = ?2, updated_at = ?3
        WHERE id = ?1 AND status = 'approved' AND payout_id IS NULL
        "#,
    )
    .bind(commission_id)
    .bind(payout_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Frees every commission a payout holds. Returns how many were released.
pub(crate) async fn release(conn: &mut SqliteConnection, payout_id: i64, now: DateTime<Utc>) -> DbResult<u64> {
    let result = sqlx::query("UPDATE commissions SET payout_id = NULL, updated_at = ?2 WHERE payout_id = ?1")
        .bind(payout_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

// =============================================================================
// Unit Tests
// =============================================================================
