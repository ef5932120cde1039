//! # Volume Tier Repository
//!
//! Per-agent volume tiers. A tier set is always replaced as a whole so the
//! stored set is never half-written or overlapping.

use agent_core::{validate_tiers, CoreError, VolumeTier};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use super::{money, rate_from_bps, rate_to_bps};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct TierRow {
    name: String,
    min_amount_cents: i64,
    max_amount_cents: Option<i64>,
    rate_bps: i64,
}

impl TryFrom<TierRow> for VolumeTier {
    type Error = DbError;

    fn try_from(row: TierRow) -> DbResult<Self> {
        Ok(VolumeTier {
            name: row.name,
            min_amount: money(row.min_amount_cents),
            max_amount: row.max_amount_cents.map(money),
            rate: rate_from_bps("volume_tiers.rate_bps", row.rate_bps)?,
        })
    }
}

/// Repository for volume tiers.
#[derive(Debug, Clone)]
pub struct TierRepository {
    pool: SqlitePool,
}

impl TierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TierRepository { pool }
    }

    /// The agent's tiers ordered by lower bound.
    pub async fn list_for_agent(&self, agent_id: i64) -> DbResult<Vec<VolumeTier>> {
        let mut conn = self.pool.acquire().await?;
        list(&mut conn, agent_id).await
    }

    /// Replaces the agent's tier set. Rejects overlapping or malformed tiers
    /// before touching storage. An empty slice clears the set.
    pub async fn replace_for_agent(&self, agent_id: i64, tiers: &[VolumeTier]) -> DbResult<()> {
        validate_tiers(tiers).map_err(CoreError::from)?;

        let mut tx = self.pool.begin().await?;

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agents WHERE id = ?1")
            .bind(agent_id)
            .fetch_one(&mut *tx)
            .await?;
        if exists == 0 {
            return Err(CoreError::AgentNotFound(agent_id).into());
        }

        sqlx::query("DELETE FROM volume_tiers WHERE agent_id = ?1")
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;

        for tier in tiers {
            sqlx::query(
                r#"
                INSERT INTO volume_tiers (agent_id, name, min_amount_cents, max_amount_cents, rate_bps)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(agent_id)
            .bind(&tier.name)
            .bind(tier.min_amount.cents())
            .bind(tier.max_amount.map(|m| m.cents()))
            .bind(rate_to_bps(tier.rate))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(agent_id, count = tiers.len(), "Volume tiers replaced");
        Ok(())
    }
}

pub(crate) async fn list(conn: &mut SqliteConnection, agent_id: i64) -> DbResult<Vec<VolumeTier>> {
    let rows: Vec<TierRow> = sqlx::query_as(
        r#"
        SELECT name, min_amount_cents, max_amount_cents, rate_bps
        FROM volume_tiers
        WHERE agent_id = ?1
        ORDER BY min_amount_cents ASC, id ASC
        "#,
    )
    .bind(agent_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(VolumeTier::try_from).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::agent;
    use agent_core::{Agent, CommissionRate, ErrorKind, Money, NewAgent};
    use chrono::Utc;

    fn tier(name: &str, min: i64, max: Option<i64>, pct: f64) -> VolumeTier {
        VolumeTier::new(
            name,
            Money::from_major_minor(min, 0),
            max.map(|m| Money::from_major_minor(m, 0)),
            CommissionRate::new(pct).unwrap(),
        )
    }

    async fn setup() -> (Database, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let agent = Agent::register(
            NewAgent {
                name: "Siti".to_string(),
                email: "siti@example.com".to_string(),
                ..Default::default()
            },
            CommissionRate::DEFAULT,
            Utc::now(),
        )
        .unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let agent = agent::insert(&mut conn, agent).await.unwrap();
        (db, agent.id())
    }

    #[tokio::test]
    async fn test_replace_and_list_sorted() {
        let (db, agent_id) = setup().await;
        let tiers = vec![
            tier("Gold", 1_000, None, 15.0),
            tier("Starter", 0, Some(500), 8.0),
            tier("Silver", 500, Some(1_000), 12.0),
        ];
        db.tiers().replace_for_agent(agent_id, &tiers).await.unwrap();

        let loaded = db.tiers().list_for_agent(agent_id).await.unwrap();
        let names: Vec<&str> = loaded.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Starter", "Silver", "Gold"]);
        assert_eq!(loaded[2].max_amount, None);

        db.tiers().replace_for_agent(agent_id, &[]).await.unwrap();
        assert!(db.tiers().list_for_agent(agent_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_tiers_rejected() {
        let (db, agent_id) = setup().await;
        db.tiers()
            .replace_for_agent(agent_id, &[tier("Base", 0, None, 10.0)])
            .await
            .unwrap();

        let err = db
            .tiers()
            .replace_for_agent(agent_id, &[tier("A", 0, Some(600), 8.0), tier("B", 500, None, 12.0)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Validation));

        // The previous set is untouched.
        assert_eq!(db.tiers().list_for_agent(agent_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let (db, _) = setup().await;
        let err = db
            .tiers()
            .replace_for_agent(777, &[tier("Base", 0, None, 10.0)])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
