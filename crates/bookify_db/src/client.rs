//! Database client for Bookify
//!
//! Wraps a sqlx SQLite pool. The client is cheap to clone and is passed explicitly to every
//! repository; nothing holds a global connection.

use crate::error::DbError;
use crate::schema;
use bookify_config::{AppConfig, DatabaseConfig};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Type alias for a database transaction
pub type DbTransaction = Transaction<'static, Sqlite>;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Database client for Bookify
#[derive(Debug, Clone)]
pub struct DbClient {
    /// The database connection pool
    pool: Pool<Sqlite>,
}

impl DbClient {
    /// Create a new database client from the application configuration.
    ///
    /// # Errors
    ///
    /// * The database configuration is missing
    /// * The database URL is empty or invalid
    /// * The database connection fails
    pub async fn new(config: &Arc<AppConfig>) -> Result<Self, DbError> {
        let db_config = config
            .database
            .as_ref()
            .ok_or_else(|| DbError::ConfigError("Database configuration is missing".to_string()))?;

        Self::from_config(db_config).await
    }

    /// Create a new database client from a database configuration
    pub async fn from_config(db_config: &DatabaseConfig) -> Result<Self, DbError> {
        let db_url = &db_config.url;
        if db_url.is_empty() {
            return Err(DbError::ConfigError("Database URL is empty".to_string()));
        }

        let max_connections = db_config.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let pool = Self::create_pool(db_url, max_connections).await?;
        Ok(Self { pool })
    }

    /// Create a new database client from a database URL
    pub async fn from_url(db_url: &str) -> Result<Self, DbError> {
        if db_url.is_empty() {
            return Err(DbError::UrlError("Database URL is empty".to_string()));
        }

        let pool = Self::create_pool(db_url, DEFAULT_MAX_CONNECTIONS).await?;
        Ok(Self { pool })
    }

    /// Create a client on a private in-memory database with the schema applied.
    ///
    /// The pool holds exactly one connection that never expires, since every new
    /// in-memory connection would see an empty database. Concurrent callers queue for it.
    pub async fn in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbError::UrlError(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::PoolError(e.to_string()))?;

        let client = Self { pool };
        client.init_schema().await?;
        Ok(client)
    }

    async fn create_pool(db_url: &str, max_connections: u32) -> Result<Pool<Sqlite>, DbError> {
        debug!("Creating database pool with URL: {}", db_url);

        // Handle both "sqlite:example.db" and "sqlite://example.db" formats
        let db_path = db_url
            .strip_prefix("sqlite://")
            .or_else(|| db_url.strip_prefix("sqlite:"))
            .unwrap_or(db_url);
        if !db_path.contains(":memory:") && !db_path.is_empty() {
            if let Some(dir) = std::path::Path::new(db_path).parent() {
                if !dir.as_os_str().is_empty() && !dir.exists() {
                    debug!("Creating directory for SQLite database: {:?}", dir);
                    std::fs::create_dir_all(dir).map_err(|e| {
                        error!("Failed to create directory for SQLite database: {}", e);
                        DbError::PoolError(format!("Failed to create directory: {}", e))
                    })?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)
            .map_err(|e| DbError::UrlError(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            // writers queue behind the booking transaction instead of failing
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to create database pool: {}", e);
                DbError::PoolError(e.to_string())
            })?;

        info!("Database pool created successfully");
        Ok(pool)
    }

    /// Get the database connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Begin a transaction
    pub async fn begin(&self) -> Result<DbTransaction, DbError> {
        self.pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionError(e.to_string()))
    }

    /// Execute a statement that returns no rows, yielding the number of rows affected.
    pub async fn execute(&self, query: &str) -> Result<u64, DbError> {
        sqlx::query(query)
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| DbError::QueryError(e.to_string()))
    }

    /// Create every table and index if missing.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        debug!("Initializing database schema");
        for statement in schema::STATEMENTS {
            self.execute(statement).await?;
        }
        info!("Database schema initialized successfully");
        Ok(())
    }

    /// Check if the database is healthy
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

impl std::fmt::Display for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DbClient")
    }
}
