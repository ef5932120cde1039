//! # agent-db: Persistence Layer for the Agent Commission Service
//!
//! SQLite storage, ledger transactions, service configuration and tracing
//! setup for the commission core in `agent-core`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Agent Commission Data Flow                          │
//! │                                                                         │
//! │  Order service: "order ORD-1 completed for agent 7"                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     agent-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │    Ledger     │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (ledger.rs)  │    │ (repository/) │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ record/approve│───►│ AgentRepo     │    │ 001_initial  │  │   │
//! │  │   │ payouts       │    │ CommissionRepo│    │ 002_rates    │  │   │
//! │  │   │ + outbox      │    │ ReportRepo .. │    │ 003_outbox   │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Per-table repositories
//! - [`ledger`] - Multi-row transactions with outbox events
//! - [`config`] - Service configuration loader
//! - [`telemetry`] - Tracing subscriber setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_db::{Database, ServiceConfig};
//!
//! let config = ServiceConfig::load(None)?;
//! agent_db::telemetry::init_tracing(&config.logging);
//!
//! let db = Database::new(config.db_config()).await?;
//! let commission = db.ledger().record_commission(&order, Utc::now()).await?;
//! let dashboard = db.reports().dashboard(commission.agent_id(), Utc::now()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, ServiceConfig};
pub use error::{DbError, DbResult};
pub use ledger::Ledger;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{
    AgentRepository, BonusRepository, CommissionFilter, CommissionRepository, OutboxEntry, OutboxEvent,
    OutboxRepository, PayoutRepository, ReportRepository, TeamRepository, TierRepository,
};
