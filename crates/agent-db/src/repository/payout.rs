//! # Payout Repository
//!
//! Payouts and their item lists. Items are written once, with the payout,
//! and never touched again.

use agent_core::{CoreError, Payout, PayoutItem, PayoutParts, PayoutPeriod, PayoutStatus};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{money, page_limit};
use crate::error::{DbError, DbResult};

const SELECT_PAYOUT: &str = r#"
    SELECT id, agent_id, period, amount_cents, status, failure_reason, paid_at,
           created_at, updated_at
    FROM payouts
"#;

#[derive(Debug, sqlx::FromRow)]
struct PayoutRow {
    id: i64,
    agent_id: i64,
    period: String,
    amount_cents: i64,
    status: PayoutStatus,
    failure_reason: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct PayoutItemRow {
    commission_id: i64,
    order_id: String,
    amount_cents: i64,
}

impl From<PayoutItemRow> for PayoutItem {
    fn from(row: PayoutItemRow) -> Self {
        PayoutItem::new(row.commission_id, row.order_id, money(row.amount_cents))
    }
}

impl PayoutRow {
    fn into_payout(self, items: Vec<PayoutItem>) -> DbResult<Payout> {
        let period: PayoutPeriod = self
            .period
            .parse()
            .map_err(|e| DbError::invalid_data(format!("payout {} period: {}", self.id, e)))?;

        Ok(Payout::restore(PayoutParts {
            id: self.id,
            agent_id: self.agent_id,
            period,
            amount: money(self.amount_cents),
            items,
            status: self.status,
            failure_reason: self.failure_reason,
            paid_at: self.paid_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }))
    }
}

/// Repository for payout reads.
///
/// Payout transitions go through [`crate::ledger::Ledger`], which moves the
/// commission claims in the same transaction.
#[derive(Debug, Clone)]
pub struct PayoutRepository {
    pool: SqlitePool,
}

impl PayoutRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PayoutRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Payout>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Gets a payout by ID, failing with `PayoutNotFound` when absent.
    pub async fn get(&self, id: i64) -> DbResult<Payout> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::PayoutNotFound(id).into())
    }

    /// An agent's payouts, newest first.
    pub async fn list_by_agent(&self, agent_id: i64, limit: u32, offset: u32) -> DbResult<Vec<Payout>> {
        debug!(agent_id, "Listing payouts");

        let sql = format!(
            "{} WHERE agent_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            SELECT_PAYOUT
        );
        let rows: Vec<PayoutRow> = sqlx::query_as(&sql)
            .bind(agent_id)
            .bind(page_limit(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;

        let mut conn = self.pool.acquire().await?;
        let mut payouts = Vec::with_capacity(rows.len());
        for row in rows {
            let items = fetch_items(&mut conn, row.id).await?;
            payouts.push(row.into_payout(items)?);
        }
        Ok(payouts)
    }

    /// Items of one payout in their original order.
    pub async fn items(&self, payout_id: i64) -> DbResult<Vec<PayoutItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_items(&mut conn, payout_id).await
    }

    pub async fn count_by_agent(&self, agent_id: i64) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payouts WHERE agent_id = ?1")
            .bind(agent_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Connection-level helpers (shared with the ledger)
// =============================================================================

async fn fetch_items(conn: &mut SqliteConnection, payout_id: i64) -> DbResult<Vec<PayoutItem>> {
    let rows: Vec<PayoutItemRow> = sqlx::query_as(
        "SELECT commission_id, order_id, amount_cents FROM payout_items WHERE payout_id = ?1 ORDER BY position",
    )
    .bind(payout_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(PayoutItem::from).collect())
}

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Payout>> {
    let sql = format!("{} WHERE id = ?1", SELECT_PAYOUT);
    let row: Option<PayoutRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&mut *conn).await?;

    match row {
        Some(row) => {
            let items = fetch_items(conn, row.id).await?;
            row.into_payout(items).map(Some)
        }
        None => Ok(None),
    }
}

pub(crate) async fn fetch_required(conn: &mut SqliteConnection, id: i64) -> DbResult<Payout> {
    fetch(conn, id)
        .await?
        .ok_or_else(|| CoreError::PayoutNotFound(id).into())
}

/// Inserts a payout with its items and returns it with its id.
pub(crate) async fn insert(conn: &mut SqliteConnection, payout: Payout) -> DbResult<Payout> {
    let result = sqlx::query(
        r#"
        INSERT INTO payouts (
            agent_id, period, amount_cents, status, failure_reason, paid_at,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(payout.agent_id())
    .bind(payout.period().to_string())
    .bind(payout.amount().cents())
    .bind(payout.status())
    .bind(payout.failure_reason())
    .bind(payout.paid_at())
    .bind(payout.created_at())
    .bind(payout.updated_at())
    .execute(&mut *conn)
    .await?;

    let payout = payout.with_id(result.last_insert_rowid());

    for (position, item) in payout.items().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO payout_items (payout_id, commission_id, position, order_id, amount_cents)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(payout.id())
        .bind(item.commission_id)
        .bind(position as i64)
        .bind(&item.order_id)
        .bind(item.amount.cents())
        .execute(&mut *conn)
        .await?;
    }

    Ok(payout)
}

/// Writes the lifecycle columns. Amount and items are immutable.
pub(crate) async fn save(conn: &mut SqliteConnection, payout: &Payout) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE payouts SET
            status = ?2,
            failure_reason = ?3,
            paid_at = ?4,
            updated_at = ?5
        WHERE id = ?1
        "#,
    )
    .bind(payout.id())
    .bind(payout.status())
    .bind(payout.failure_reason())
    .bind(payout.paid_at())
    .bind(payout.updated_at())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::PayoutNotFound(payout.id()).into());
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::{agent, commission};
    use agent_core::{Agent, Commission, CommissionRate, Money, NewAgent, NewCommission};

    #[tokio::test]
    async fn test_insert_and_load_with_items() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let mut conn = db.pool().acquire().await.unwrap();

        let agent = Agent::register(
            NewAgent {
                name: "Hafiz".to_string(),
                email: "hafiz@example.com".to_string(),
                ..Default::default()
            },
            CommissionRate::DEFAULT,
            now,
        )
        .unwrap();
        let agent = agent::insert(&mut conn, agent).await.unwrap();

        let mut commissions = Vec::new();
        for (order, cents) in [("ORD-A", 5_000), ("ORD-B", 2_500)] {
            let mut c = Commission::create(
                NewCommission {
                    amount: Some(Money::from_cents(cents)),
                    ..NewCommission::new(agent.id(), order, Money::from_cents(100_000), CommissionRate::DEFAULT)
                },
                now,
            )
            .unwrap();
            c = commission::insert(&mut conn, c).await.unwrap();
            c.approve(now).unwrap();
            commissions.push(c);
        }

        let payout = Payout::from_commissions(agent.id(), PayoutPeriod::current(now), &commissions, now).unwrap();
        let payout = insert(&mut conn, payout).await.unwrap();
        drop(conn);

        let loaded = db.payouts().get(payout.id()).await.unwrap();
        assert_eq!(loaded.amount(), Money::from_cents(7_500));
        assert_eq!(loaded.item_count(), 2);
        assert_eq!(loaded.items()[0].order_id, "ORD-A");
        assert_eq!(loaded.period(), PayoutPeriod::current(now));
        assert_eq!(loaded.status(), PayoutStatus::Pending);

        assert_eq!(db.payouts().list_by_agent(agent.id(), 10, 0).await.unwrap().len(), 1);
        assert_eq!(db.payouts().count_by_agent(agent.id()).await.unwrap(), 1);
        assert_eq!(db.payouts().items(payout.id()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_payout() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.payouts().get_by_id(1).await.unwrap().is_none());
        assert!(db.payouts().get(1).await.unwrap_err().is_not_found());
    }
}
