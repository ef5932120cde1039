//! # Database Error Types
//!
//! Error types for database and ledger operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)        Domain refusal (CoreError)          │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Service layer maps DbError::kind() to a response status               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use agent_core::{CoreError, ErrorKind};
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - A second commission for the same order id
    /// - Duplicate agent email or code, duplicate team code
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A concurrent writer got there first.
    ///
    /// ## When This Occurs
    /// - A commission was claimed by another payout between read and claim
    /// - Paying or cancelling a commission that sits in a payout
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored row could not be turned back into a domain value.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// The domain refused the operation.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        DbError::InvalidData(message.into())
    }

    /// Domain classification, when there is one.
    ///
    /// Missing rows classify as `NotFound` whether they came from a query or
    /// from the domain.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DbError::Domain(err) => Some(err.kind()),
            DbError::NotFound { .. } => Some(ErrorKind::NotFound),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::ColumnDecode   → DbError::InvalidData
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if is_lock_contention(db_err.code().as_deref()) {
                    // Another writer holds the database; the caller may retry
                    DbError::Conflict(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::ColumnDecode { index, source } => {
                DbError::InvalidData(format!("column {}: {}", index, source))
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_BUSY_RECOVERY (261) and
/// SQLITE_BUSY_SNAPSHOT (517), as reported by sqlx's extended error codes.
fn is_lock_contention(code: Option<&str>) -> bool {
    matches!(code, Some("5" | "6" | "261" | "517"))
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::InvalidData(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_keep_their_kind() {
        let err: DbError = CoreError::CommissionNotFound(4).into();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert!(err.is_not_found());

        let err: DbError = CoreError::AlreadyTopTier { agent_id: 1 }.into();
        assert_eq!(err.kind(), Some(ErrorKind::StateTransition));

        assert!(DbError::not_found("Payout", 9).is_not_found());
        assert_eq!(DbError::Conflict("claimed".into()).kind(), None);
    }

    #[test]
    fn test_lock_contention_codes() {
        assert!(is_lock_contention(Some("5")));
        assert!(is_lock_contention(Some("517")));
        assert!(!is_lock_contention(Some("2067"))); // SQLITE_CONSTRAINT_UNIQUE
        assert!(!is_lock_contention(None));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(DbError::not_found("Agent", 3).to_string(), "Agent not found: 3");
        assert_eq!(
            DbError::duplicate("commissions.order_id", "ORD-1").to_string(),
            "Duplicate commissions.order_id: 'ORD-1' already exists"
        );
    }
}
