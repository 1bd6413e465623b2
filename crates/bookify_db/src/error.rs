//! Error types for the database client

use thiserror::Error;
use tracing::error;

/// Errors that can occur when working with the database client
#[derive(Debug, Error)]
pub enum DbError {
    /// Error from SQLx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// Error with the database configuration
    #[error("Database configuration error: {0}")]
    ConfigError(String),

    /// Error with database URL parsing
    #[error("Database URL error: {0}")]
    UrlError(String),

    /// Error with database pool creation
    #[error("Database pool error: {0}")]
    PoolError(String),

    /// Error with database query
    #[error("Database query error: {0}")]
    QueryError(String),

    /// A unique or foreign key constraint rejected the write
    #[error("Database constraint violated: {0}")]
    ConstraintViolation(String),

    /// Error with database transaction
    #[error("Database transaction error: {0}")]
    TransactionError(String),

    /// A stored value could not be mapped back into a domain model
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl DbError {
    /// Logs and classifies a failed statement. `operation` names what was attempted.
    pub fn query(operation: &str, err: sqlx::Error) -> Self {
        error!("Failed to {}: {}", operation, err);
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.is_unique_violation() || db_err.is_foreign_key_violation() =>
            {
                DbError::ConstraintViolation(format!("{}: {}", operation, db_err))
            }
            _ => DbError::QueryError(format!("{}: {}", operation, err)),
        }
    }
}

impl From<DbError> for bookify_common::BookifyError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ConstraintViolation(msg) => bookify_common::BookifyError::ConflictError(msg),
            other => bookify_common::BookifyError::DatabaseError(other.to_string()),
        }
    }
}
