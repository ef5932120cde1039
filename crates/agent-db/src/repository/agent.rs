//! # Agent Repository
//!
//! Storage for agent profiles. Agents are never deleted; deactivation is a
//! status change written through [`AgentRepository::update`] or the ledger.
//!
//! ## Agent Codes
//! ```text
//! register(code = None)
//!      │
//!      ▼
//! INSERT ... code = <uuid placeholder>      (code is UNIQUE NOT NULL)
//!      │
//!      ▼
//! Agent::with_id(id)  → code = "AGT0042"
//!      │
//!      ▼
//! UPDATE agents SET code = 'AGT0042'         (same transaction)
//! ```

use agent_core::{Agent, AgentParts, AgentStatus, AgentTier, CoreError};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::{money, page_limit, rate_from_bps, rate_to_bps};
use crate::error::{DbError, DbResult};

const SELECT_AGENT: &str = r#"
    SELECT id, code, name, email, phone, commission_rate_bps, tier, status,
           total_earned_cents, team_id, created_at, updated_at
    FROM agents
"#;

#[derive(Debug, sqlx::FromRow)]
struct AgentRow {
    id: i64,
    code: String,
    name: String,
    email: String,
    phone: Option<String>,
    commission_rate_bps: i64,
    tier: AgentTier,
    status: AgentStatus,
    total_earned_cents: i64,
    team_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AgentRow> for Agent {
    type Error = DbError;

    fn try_from(row: AgentRow) -> DbResult<Self> {
        Ok(Agent::restore(AgentParts {
            id: row.id,
            code: row.code,
            name: row.name,
            email: row.email,
            phone: row.phone,
            commission_rate: rate_from_bps("agents.commission_rate_bps", row.commission_rate_bps)?,
            tier: row.tier,
            status: row.status,
            total_earned: money(row.total_earned_cents),
            team_id: row.team_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }
}

/// Repository for agent database operations.
#[derive(Debug, Clone)]
pub struct AgentRepository {
    pool: SqlitePool,
}

impl AgentRepository {
    /// Creates a new AgentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AgentRepository { pool }
    }

    /// Gets an agent by ID.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Agent>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Gets an agent by ID, failing with `AgentNotFound` when absent.
    pub async fn get(&self, id: i64) -> DbResult<Agent> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::AgentNotFound(id).into())
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Agent>> {
        let sql = format!("{} WHERE code = ?1", SELECT_AGENT);
        let row: Option<AgentRow> = sqlx::query_as(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Agent::try_from).transpose()
    }

    /// Emails are stored lowercased.
    pub async fn get_by_email(&self, email: &str) -> DbResult<Option<Agent>> {
        let sql = format!("{} WHERE email = ?1", SELECT_AGENT);
        let row: Option<AgentRow> = sqlx::query_as(&sql)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Agent::try_from).transpose()
    }

    /// Lists agents, optionally filtered by status, ordered by id.
    pub async fn list(&self, status: Option<AgentStatus>, limit: u32, offset: u32) -> DbResult<Vec<Agent>> {
        let sql = format!(
            "{} WHERE (?1 IS NULL OR status = ?1) ORDER BY id LIMIT ?2 OFFSET ?3",
            SELECT_AGENT
        );
        let rows: Vec<AgentRow> = sqlx::query_as(&sql)
            .bind(status)
            .bind(page_limit(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    /// Members of a team, ordered by id.
    pub async fn list_by_team(&self, team_id: i64) -> DbResult<Vec<Agent>> {
        let sql = format!("{} WHERE team_id = ?1 ORDER BY id", SELECT_AGENT);
        let rows: Vec<AgentRow> = sqlx::query_as(&sql)
            .bind(team_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    /// Writes every mutable column of an existing agent.
    pub async fn update(&self, agent: &Agent) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        save(&mut conn, agent).await
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Connection-level helpers (shared with the ledger)
// =============================================================================

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Agent>> {
    let sql = format!("{} WHERE id = ?1", SELECT_AGENT);
    let row: Option<AgentRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.map(Agent::try_from).transpose()
}

pub(crate) async fn fetch_required(conn: &mut SqliteConnection, id: i64) -> DbResult<Agent> {
    fetch(conn, id)
        .await?
        .ok_or_else(|| CoreError::AgentNotFound(id).into())
}

/// Inserts a registered agent and returns it with its id and final code.
pub(crate) async fn insert(conn: &mut SqliteConnection, agent: Agent) -> DbResult<Agent> {
    let placeholder = if agent.code().is_empty() {
        Uuid::new_v4().to_string()
    } else {
        agent.code().to_string()
    };

    let result = sqlx::query(
        r#"
        INSERT INTO agents (
            code, name, email, phone, commission_rate_bps, tier, status,
            total_earned_cents, team_id, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&placeholder)
    .bind(agent.name())
    .bind(agent.email())
    .bind(agent.phone())
    .bind(rate_to_bps(agent.commission_rate()))
    .bind(agent.tier())
    .bind(agent.status())
    .bind(agent.total_earned().cents())
    .bind(agent.team_id())
    .bind(agent.created_at())
    .bind(agent.updated_at())
    .execute(&mut *conn)
    .await
    .map_err(|err| match DbError::from(err) {
        DbError::UniqueViolation { field, .. } if field.ends_with("email") => {
            DbError::duplicate(field, agent.email())
        }
        DbError::UniqueViolation { field, .. } => DbError::duplicate(field, placeholder.clone()),
        other => other,
    })?;

    let agent = agent.with_id(result.last_insert_rowid());

    if agent.code() != placeholder {
        sqlx::query("UPDATE agents SET code = ?2 WHERE id = ?1")
            .bind(agent.id())
            .bind(agent.code())
            .execute(&mut *conn)
            .await?;
    }

    debug!(id = agent.id(), code = %agent.code(), "Agent inserted");
    Ok(agent)
}

pub(crate) async fn save(conn: &mut SqliteConnection, agent: &Agent) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE agents SET
            name = ?2,
            phone = ?3,
            commission_rate_bps = ?4,
            tier = ?5,
            status = ?6,
            total_earned_cents = ?7,
            team_id = ?8,
            updated_at = ?9
        WHERE id = ?1
        "#,
    )
    .bind(agent.id())
    .bind(agent.name())
    .bind(agent.phone())
    .bind(rate_to_bps(agent.commission_rate()))
    .bind(agent.tier())
    .bind(agent.status())
    .bind(agent.total_earned().cents())
    .bind(agent.team_id())
    .bind(agent.updated_at())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::AgentNotFound(agent.id()).into());
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
