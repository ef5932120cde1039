//! # Report Repository
//!
//! Aggregates an agent's commission rows in SQL and hands the resulting
//! [`CommissionBucket`]s to the rollups in `agent_core::reporting`. No
//! figure is stored; every report is recomputed from the ledger.
//!
//! ```text
//! commissions ──► GROUP BY month, status ──► CommissionBucket[] ──► Dashboard
//!                                                                ├─► MonthlyPerformance[]
//!                                                                ├─► AgentStats
//!                                                                └─► CommissionStats
//! ```
//!
//! Work per report is bounded by months × statuses, not by order volume.
//! `created_at` is stored as UTC ISO-8601 text, so its first seven
//! characters are the `YYYY-MM` month key.

use agent_core::{
    monthly_performance, reporting::trailing_periods, AgentStats, CommissionBucket, CommissionStats,
    CommissionStatus, CoreError, Dashboard, MonthlyPerformance, PayoutPeriod, MONTHLY_PERFORMANCE_WINDOW,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::money;
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct BucketRow {
    month: String,
    status: CommissionStatus,
    orders: i64,
    sales_cents: i64,
    commission_cents: i64,
}

impl TryFrom<BucketRow> for CommissionBucket {
    type Error = DbError;

    fn try_from(row: BucketRow) -> Result<Self, Self::Error> {
        let period: PayoutPeriod = row
            .month
            .parse()
            .map_err(|_| DbError::invalid_data(format!("commission month {:?}", row.month)))?;
        Ok(CommissionBucket {
            period,
            status: row.status,
            orders: row.orders,
            sales: money(row.sales_cents),
            commission: money(row.commission_cents),
        })
    }
}

/// Repository for agent reports.
#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    pub async fn dashboard(&self, agent_id: i64, now: DateTime<Utc>) -> DbResult<Dashboard> {
        let buckets = self.buckets(agent_id, None).await?;
        let total_customers: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT customer_ref) FROM commissions WHERE agent_id = ?1",
        )
        .bind(agent_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Dashboard::build(agent_id, &buckets, total_customers, now))
    }

    /// The trailing twelve months, oldest first.
    pub async fn monthly_performance(&self, agent_id: i64, now: DateTime<Utc>) -> DbResult<Vec<MonthlyPerformance>> {
        let first = trailing_periods(now, MONTHLY_PERFORMANCE_WINDOW).first().copied();
        let buckets = self.buckets(agent_id, first).await?;
        Ok(monthly_performance(&buckets, now))
    }

    pub async fn agent_stats(&self, agent_id: i64, now: DateTime<Utc>) -> DbResult<AgentStats> {
        let buckets = self.buckets(agent_id, None).await?;
        let total_payouts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payouts WHERE agent_id = ?1")
            .bind(agent_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(AgentStats::build(agent_id, &buckets, total_payouts, now))
    }

    pub async fn commission_stats(&self, agent_id: i64) -> DbResult<CommissionStats> {
        let buckets = self.buckets(agent_id, None).await?;
        Ok(CommissionStats::build(agent_id, &buckets))
    }

    /// Per-month, per-status totals, optionally from `since` onwards.
    async fn buckets(&self, agent_id: i64, since: Option<PayoutPeriod>) -> DbResult<Vec<CommissionBucket>> {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agents WHERE id = ?1")
            .bind(agent_id)
            .fetch_one(&self.pool)
            .await?;
        if exists == 0 {
            return Err(CoreError::AgentNotFound(agent_id).into());
        }

        let rows: Vec<BucketRow> = sqlx::query_as(
            r#"
            SELECT substr(created_at, 1, 7)           AS month,
                   status,
                   COUNT(*)                           AS orders,
                   COALESCE(SUM(order_total_cents), 0) AS sales_cents,
                   COALESCE(SUM(amount_cents), 0)      AS commission_cents
            FROM commissions
            WHERE agent_id = ?1
              AND (?2 IS NULL OR substr(created_at, 1, 7) >= ?2)
            GROUP BY month, status
            ORDER BY month ASC
            "#,
        )
        .bind(agent_id)
        .bind(since.map(|p| p.to_string()))
        .fetch_all(&self.pool)
        .await?;

        debug!(agent_id, buckets = rows.len(), "Aggregated commission buckets");
        rows.into_iter().map(CommissionBucket::try_from).collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
