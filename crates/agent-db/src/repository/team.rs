//! # Team Repository
//!
//! Teams and team membership. Membership lives on the agent row
//! (`agents.team_id`); the team row only knows its leader.

use agent_core::{CoreError, Team};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{money, rate_from_bps, rate_to_bps};
use crate::error::{DbError, DbResult};

const SELECT_TEAM: &str = r#"
    SELECT id, code, name, leader_id, monthly_target_cents, commission_boost_bps,
           is_active, created_at, updated_at
    FROM teams
"#;

#[derive(Debug, sqlx::FromRow)]
struct TeamRow {
    id: i64,
    code: String,
    name: String,
    leader_id: Option<i64>,
    monthly_target_cents: i64,
    commission_boost_bps: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TeamRow> for Team {
    type Error = DbError;

    fn try_from(row: TeamRow) -> DbResult<Self> {
        Ok(Team {
            id: row.id,
            code: row.code,
            name: row.name,
            leader_id: row.leader_id,
            monthly_target: money(row.monthly_target_cents),
            commission_boost: rate_from_bps("teams.commission_boost_bps", row.commission_boost_bps)?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for team database operations.
#[derive(Debug, Clone)]
pub struct TeamRepository {
    pool: SqlitePool,
}

impl TeamRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TeamRepository { pool }
    }

    /// Inserts a new team and returns it with its id.
    pub async fn insert(&self, team: Team) -> DbResult<Team> {
        let result = sqlx::query(
            r#"
            INSERT INTO teams (
                code, name, leader_id, monthly_target_cents, commission_boost_bps,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&team.code)
        .bind(&team.name)
        .bind(team.leader_id)
        .bind(team.monthly_target.cents())
        .bind(rate_to_bps(team.commission_boost))
        .bind(team.is_active)
        .bind(team.created_at)
        .bind(team.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| match DbError::from(err) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, team.code.clone()),
            other => other,
        })?;

        let team = team.with_id(result.last_insert_rowid());
        info!(id = team.id, code = %team.code, "Team created");
        Ok(team)
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Team>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Gets a team by ID, failing with `TeamNotFound` when absent.
    pub async fn get(&self, id: i64) -> DbResult<Team> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::TeamNotFound(id).into())
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Team>> {
        let sql = format!("{} WHERE code = ?1", SELECT_TEAM);
        let row: Option<TeamRow> = sqlx::query_as(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Team::try_from).transpose()
    }

    pub async fn list(&self, active_only: bool) -> DbResult<Vec<Team>> {
        let sql = format!("{} WHERE (?1 = 0 OR is_active = 1) ORDER BY code", SELECT_TEAM);
        let rows: Vec<TeamRow> = sqlx::query_as(&sql)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Team::try_from).collect()
    }

    /// Writes every mutable column of an existing team.
    pub async fn update(&self, team: &Team) -> DbResult<()> {
        debug!(id = team.id, "Updating team");

        let result = sqlx::query(
            r#"
            UPDATE teams SET
                name = ?2,
                leader_id = ?3,
                monthly_target_cents = ?4,
                commission_boost_bps = ?5,
                is_active = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(team.id)
        .bind(&team.name)
        .bind(team.leader_id)
        .bind(team.monthly_target.cents())
        .bind(rate_to_bps(team.commission_boost))
        .bind(team.is_active)
        .bind(team.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::TeamNotFound(team.id).into());
        }
        Ok(())
    }

    /// Number of agents referencing the team.
    pub async fn member_count(&self, team_id: i64) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agents WHERE team_id = ?1")
            .bind(team_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Team>> {
    let sql = format!("{} WHERE id = ?1", SELECT_TEAM);
    let row: Option<TeamRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.map(Team::try_from).transpose()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use agent_core::{CommissionRate, Money};

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let boost = CommissionRate::new(2.0).unwrap();
        let team = Team::new("TEAM-KL", "Kuala Lumpur", Some(boost), Utc::now()).unwrap();

        let saved = db.teams().insert(team).await.unwrap();
        assert!(saved.id > 0);

        let loaded = db.teams().get(saved.id).await.unwrap();
        assert_eq!(loaded.commission_boost, boost);
        assert!(loaded.is_active);
        assert!(db.teams().get_by_code("TEAM-KL").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_code() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.teams()
            .insert(Team::new("TEAM-A", "A", None, Utc::now()).unwrap())
            .await
            .unwrap();
        let err = db
            .teams()
            .insert(Team::new("TEAM-A", "Again", None, Utc::now()).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_update_and_list_active() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut team = db
            .teams()
            .insert(Team::new("TEAM-PG", "Penang", None, Utc::now()).unwrap())
            .await
            .unwrap();
        db.teams()
            .insert(Team::new("TEAM-JB", "Johor", None, Utc::now()).unwrap())
            .await
            .unwrap();

        team.set_target(Money::from_major_minor(20_000, 0), Utc::now()).unwrap();
        team.deactivate(Utc::now());
        db.teams().update(&team).await.unwrap();

        let loaded = db.teams().get(team.id).await.unwrap();
        assert_eq!(loaded.monthly_target, Money::from_major_minor(20_000, 0));
        assert_eq!(db.teams().list(true).await.unwrap().len(), 1);
        assert_eq!(db.teams().list(false).await.unwrap().len(), 2);
        assert_eq!(db.teams().member_count(team.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_team() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.teams().get(5).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
