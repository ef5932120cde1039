//! # Bonus Rate Repository
//!
//! Product and category bonus tables, plus per-agent category rates.
//!
//! ## Category Precedence
//! ```text
//! order.category_ids = [C1, C2]
//!
//! agent_category_rates (agent 7):  C1 → 3%
//! category_bonus_rates (global):   C1 → 1%,  C2 → 2%
//!
//! category_bonuses_for(7, [C1, C2])  →  [C1 3%, C2 2%]
//! ```
//! An agent's own entry replaces the global one for the same category,
//! including an inactive agent entry, which switches that category off for
//! the agent.
//!
//! ## Id Lists
//! Lookups bind the order's ids as one JSON array and expand it with
//! `json_each`, so each calculation reads only the matching rows:
//! ```text
//! WHERE item_id IN (SELECT value FROM json_each('["P-1","P-2"]'))
//! ```
//! Item ids are trimmed on every write and lookup.

use agent_core::validation::validate_item_id;
use agent_core::{BonusRate, CoreError};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info};

use super::{rate_from_bps, rate_to_bps};
use crate::error::{DbError, DbResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BonusTable {
    Product,
    Category,
}

impl BonusTable {
    fn name(&self) -> &'static str {
        match self {
            BonusTable::Product => "product_bonus_rates",
            BonusTable::Category => "category_bonus_rates",
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BonusRow {
    item_id: String,
    item_name: String,
    rate_bps: i64,
    is_active: bool,
}

impl TryFrom<BonusRow> for BonusRate {
    type Error = DbError;

    fn try_from(row: BonusRow) -> DbResult<Self> {
        Ok(BonusRate {
            rate: rate_from_bps("bonus rate_bps", row.rate_bps)?,
            item_id: row.item_id,
            item_name: row.item_name,
            is_active: row.is_active,
        })
    }
}

/// Repository for bonus-rate tables.
#[derive(Debug, Clone)]
pub struct BonusRepository {
    pool: SqlitePool,
}

impl BonusRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BonusRepository { pool }
    }

    // =========================================================================
    // Global tables
    // =========================================================================

    pub async fn upsert_product(&self, bonus: &BonusRate, now: DateTime<Utc>) -> DbResult<()> {
        self.upsert(BonusTable::Product, bonus, now).await
    }

    pub async fn upsert_category(&self, bonus: &BonusRate, now: DateTime<Utc>) -> DbResult<()> {
        self.upsert(BonusTable::Category, bonus, now).await
    }

    pub async fn deactivate_product(&self, item_id: &str, now: DateTime<Utc>) -> DbResult<()> {
        self.deactivate(BonusTable::Product, item_id, now).await
    }

    pub async fn deactivate_category(&self, item_id: &str, now: DateTime<Utc>) -> DbResult<()> {
        self.deactivate(BonusTable::Category, item_id, now).await
    }

    pub async fn list_products(&self) -> DbResult<Vec<BonusRate>> {
        self.list_table(BonusTable::Product).await
    }

    pub async fn list_categories(&self) -> DbResult<Vec<BonusRate>> {
        self.list_table(BonusTable::Category).await
    }

    /// Active product entries among `product_ids`.
    pub async fn product_bonuses_for(&self, product_ids: &[String]) -> DbResult<Vec<BonusRate>> {
        let mut conn = self.pool.acquire().await?;
        product_bonuses_for(&mut conn, product_ids).await
    }

    /// Category entries among `category_ids` that apply to `agent_id`, with
    /// the agent's own entries replacing global ones.
    pub async fn category_bonuses_for(&self, agent_id: i64, category_ids: &[String]) -> DbResult<Vec<BonusRate>> {
        let mut conn = self.pool.acquire().await?;
        category_bonuses_for(&mut conn, agent_id, category_ids).await
    }

    // =========================================================================
    // Per-agent category rates
    // =========================================================================

    /// The agent's category rates, active or not.
    pub async fn agent_categories(&self, agent_id: i64) -> DbResult<Vec<BonusRate>> {
        let mut conn = self.pool.acquire().await?;
        agent_categories(&mut conn, agent_id).await
    }

    /// Replaces the agent's whole category rate set in one transaction.
    pub async fn replace_agent_categories(&self, agent_id: i64, rates: &[BonusRate]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agents WHERE id = ?1")
            .bind(agent_id)
            .fetch_one(&mut *tx)
            .await?;
        if exists == 0 {
            return Err(CoreError::AgentNotFound(agent_id).into());
        }

        sqlx::query("DELETE FROM agent_category_rates WHERE agent_id = ?1")
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;

        for rate in rates {
            let category_id = validate_item_id("category_id", &rate.item_id).map_err(CoreError::from)?;
            sqlx::query(
                r#"
                INSERT INTO agent_category_rates (agent_id, category_id, category_name, rate_bps, is_active)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(agent_id)
            .bind(&category_id)
            .bind(&rate.item_name)
            .bind(rate_to_bps(rate.rate))
            .bind(rate.is_active)
            .execute(&mut *tx)
            .await
            .map_err(|err| match DbError::from(err) {
                DbError::UniqueViolation { field, .. } => DbError::duplicate(field, category_id.clone()),
                other => other,
            })?;
        }

        tx.commit().await?;
        info!(agent_id, count = rates.len(), "Agent category rates replaced");
        Ok(())
    }

    // =========================================================================
    // Shared
    // =========================================================================

    async fn upsert(&self, table: BonusTable, bonus: &BonusRate, now: DateTime<Utc>) -> DbResult<()> {
        let item_id = validate_item_id("item_id", &bonus.item_id).map_err(CoreError::from)?;
        debug!(table = table.name(), item_id = %item_id, rate = %bonus.rate, "Upserting bonus rate");

        let sql = format!(
            r#"
            INSERT INTO {} (item_id, item_name, rate_bps, is_active, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(item_id) DO UPDATE SET
                item_name = excluded.item_name,
                rate_bps = excluded.rate_bps,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
            table.name()
        );
        sqlx::query(&sql)
            .bind(&item_id)
            .bind(&bonus.item_name)
            .bind(rate_to_bps(bonus.rate))
            .bind(bonus.is_active)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate(&self, table: BonusTable, item_id: &str, now: DateTime<Utc>) -> DbResult<()> {
        let sql = format!(
            "UPDATE {} SET is_active = 0, updated_at = ?2 WHERE item_id = ?1",
            table.name()
        );
        let item_id = item_id.trim();
        let result = sqlx::query(&sql)
            .bind(item_id)
            .bind(now)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(table.name(), item_id));
        }
        Ok(())
    }

    async fn list_table(&self, table: BonusTable) -> DbResult<Vec<BonusRate>> {
        let mut conn = self.pool.acquire().await?;
        list(&mut conn, table).await
    }
}

// =============================================================================
// Connection-level helpers (shared with the ledger)
// =============================================================================

async fn list(conn: &mut SqliteConnection, table: BonusTable) -> DbResult<Vec<BonusRate>> {
    let sql = format!(
        "SELECT item_id, item_name, rate_bps, is_active FROM {} ORDER BY item_id",
        table.name()
    );
    let rows: Vec<BonusRow> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;
    rows.into_iter().map(BonusRate::try_from).collect()
}

async fn agent_categories(conn: &mut SqliteConnection, agent_id: i64) -> DbResult<Vec<BonusRate>> {
    let rows: Vec<BonusRow> = sqlx::query_as(
        r#"
        SELECT category_id AS item_id, category_name AS item_name, rate_bps, is_active
        FROM agent_category_rates
        WHERE agent_id = ?1
        ORDER BY category_id
        "#,
    )
    .bind(agent_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(BonusRate::try_from).collect()
}

/// The ids as a JSON array for `json_each`, trimmed and without blanks.
/// `None` when nothing is left to look up.
fn id_list(ids: &[String]) -> DbResult<Option<String>> {
    let ids: Vec<&str> = ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()).collect();
    if ids.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(&ids)?))
}

pub(crate) async fn product_bonuses_for(conn: &mut SqliteConnection, product_ids: &[String]) -> DbResult<Vec<BonusRate>> {
    let Some(ids) = id_list(product_ids)? else {
        return Ok(Vec::new());
    };
    let rows: Vec<BonusRow> = sqlx::query_as(
        r#"
        SELECT item_id, item_name, rate_bps, is_active
        FROM product_bonus_rates
        WHERE is_active = 1
          AND item_id IN (SELECT value FROM json_each(?1))
        ORDER BY item_id
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(BonusRate::try_from).collect()
}

pub(crate) async fn category_bonuses_for(
    conn: &mut SqliteConnection,
    agent_id: i64,
    category_ids: &[String],
) -> DbResult<Vec<BonusRate>> {
    let Some(ids) = id_list(category_ids)? else {
        return Ok(Vec::new());
    };

    // Every override for the wanted ids, active or not: an inactive one
    // still hides the global entry.
    let overrides: Vec<BonusRow> = sqlx::query_as(
        r#"
        SELECT category_id AS item_id, category_name AS item_name, rate_bps, is_active
        FROM agent_category_rates
        WHERE agent_id = ?1
          AND category_id IN (SELECT value FROM json_each(?2))
        ORDER BY category_id
        "#,
    )
    .bind(agent_id)
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let globals: Vec<BonusRow> = sqlx::query_as(
        r#"
        SELECT item_id, item_name, rate_bps, is_active
        FROM category_bonus_rates
        WHERE is_active = 1
          AND item_id IN (SELECT value FROM json_each(?1))
        ORDER BY item_id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let overridden: HashSet<String> = overrides.iter().map(|row| row.item_id.clone()).collect();
    let merged: Vec<BonusRate> = overrides
        .into_iter()
        .filter(|row| row.is_active)
        .chain(globals.into_iter().filter(|row| !overridden.contains(&row.item_id)))
        .map(BonusRate::try_from)
        .collect::<DbResult<_>>()?;

    debug!(agent_id, matched = merged.len(), "Resolved category bonuses");
    Ok(merged)
}

// =============================================================================
// Unit Tests
// =============================================================================
