//! Repository for calendar connections
//!
//! Every provider-facing lookup filters on `provider_id`; tenant isolation is enforced
//! here and nowhere else.

use crate::error::DbError;
use crate::DbClient;
use bookify_common::models::{CalendarConnection, CalendarSettings, Platform};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct DbCalendarConnection {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub platform: String,
    pub account_email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub calendars: Json<Vec<CalendarSettings>>,
    pub is_active: bool,
    pub reauth_required: bool,
    pub is_default_for_bookings: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_frequency_minutes: i64,
    pub webhook_subscription_id: Option<String>,
    pub webhook_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbCalendarConnection> for CalendarConnection {
    type Error = DbError;

    fn try_from(db: DbCalendarConnection) -> Result<Self, Self::Error> {
        let platform = db
            .platform
            .parse::<Platform>()
            .map_err(DbError::InvalidData)?;
        Ok(Self {
            id: db.id,
            provider_id: db.provider_id,
            platform,
            account_email: db.account_email,
            access_token: db.access_token,
            refresh_token: db.refresh_token,
            token_expires_at: db.token_expires_at,
            calendars: db.calendars.0,
            is_active: db.is_active,
            reauth_required: db.reauth_required,
            is_default_for_bookings: db.is_default_for_bookings,
            last_sync_at: db.last_sync_at,
            sync_frequency_minutes: db.sync_frequency_minutes,
            webhook_subscription_id: db.webhook_subscription_id,
            webhook_expires_at: db.webhook_expires_at,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

/// Token material written back after a refresh.
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub access_token: String,
    /// `None` keeps the stored refresh token (platform did not rotate it).
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Repository for calendar connections
pub trait ConnectionRepository {
    fn insert_connection(
        &self,
        connection: CalendarConnection,
    ) -> impl std::future::Future<Output = Result<CalendarConnection, DbError>> + Send;

    fn find_connection(
        &self,
        connection_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<CalendarConnection>, DbError>> + Send;

    /// Connections of a provider, optionally only the active ones.
    fn find_for_provider(
        &self,
        provider_id: Uuid,
        active_only: bool,
    ) -> impl std::future::Future<Output = Result<Vec<CalendarConnection>, DbError>> + Send;

    /// Stores refreshed tokens in one statement.
    fn update_tokens(
        &self,
        connection_id: Uuid,
        update: TokenUpdate,
    ) -> impl std::future::Future<Output = Result<(), DbError>> + Send;

    /// Deactivates the connection until the provider reconnects it.
    fn mark_reauth_required(
        &self,
        connection_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), DbError>> + Send;

    fn mark_synced(
        &self,
        connection_id: Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), DbError>> + Send;

    /// Makes `connection_id` the only default-for-bookings connection of the provider.
    fn set_default_for_bookings(
        &self,
        provider_id: Uuid,
        connection_id: Uuid,
    ) -> impl std::future::Future<Output = Result<bool, DbError>> + Send;

    /// Deletes the connection; its cached events go with it.
    fn delete_connection(
        &self,
        provider_id: Uuid,
        connection_id: Uuid,
    ) -> impl std::future::Future<Output = Result<bool, DbError>> + Send;
}

/// SQL implementation of the connection repository
#[derive(Debug, Clone)]
pub struct SqlConnectionRepository {
    db_client: DbClient,
}

impl SqlConnectionRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }
}

fn into_models(rows: Vec<DbCalendarConnection>) -> Vec<CalendarConnection> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            CalendarConnection::try_from(row)
                .map_err(|e| warn!("Skipping unreadable connection {}: {}", id, e))
                .ok()
        })
        .collect()
}

impl ConnectionRepository for SqlConnectionRepository {
    async fn insert_connection(
        &self,
        connection: CalendarConnection,
    ) -> Result<CalendarConnection, DbError> {
        debug!(
            "Inserting {} connection {} for provider {}",
            connection.platform, connection.id, connection.provider_id
        );

        let mut tx = self.db_client.begin().await?;
        if connection.is_default_for_bookings {
            sqlx::query(
                "UPDATE calendar_connections SET is_default_for_bookings = 0 WHERE provider_id = $1",
            )
            .bind(connection.provider_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query("clear default connection", e))?;
        }

        sqlx::query(
            r#"
            INSERT INTO calendar_connections (
                id, provider_id, platform, account_email, access_token, refresh_token,
                token_expires_at, calendars, is_active, reauth_required, is_default_for_bookings,
                last_sync_at, sync_frequency_minutes, webhook_subscription_id, webhook_expires_at,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(connection.id)
        .bind(connection.provider_id)
        .bind(connection.platform.as_str())
        .bind(&connection.account_email)
        .bind(&connection.access_token)
        .bind(&connection.refresh_token)
        .bind(connection.token_expires_at)
        .bind(Json(&connection.calendars))
        .bind(connection.is_active)
        .bind(connection.reauth_required)
        .bind(connection.is_default_for_bookings)
        .bind(connection.last_sync_at)
        .bind(connection.sync_frequency_minutes)
        .bind(&connection.webhook_subscription_id)
        .bind(connection.webhook_expires_at)
        .bind(connection.created_at)
        .bind(connection.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::query("insert connection", e))?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionError(e.to_string()))?;

        info!("Connection {} stored", connection.id);
        Ok(connection)
    }

    async fn find_connection(
        &self,
        connection_id: Uuid,
    ) -> Result<Option<CalendarConnection>, DbError> {
        let row = sqlx::query_as::<_, DbCalendarConnection>(
            "SELECT * FROM calendar_connections WHERE id = $1",
        )
        .bind(connection_id)
        .fetch_optional(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("find connection", e))?;

        row.map(CalendarConnection::try_from).transpose()
    }

    async fn find_for_provider(
        &self,
        provider_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<CalendarConnection>, DbError> {
        let rows = sqlx::query_as::<_, DbCalendarConnection>(
            r#"
            SELECT * FROM calendar_connections
            WHERE provider_id = $1 AND ($2 = 0 OR is_active = 1)
            ORDER BY created_at
            "#,
        )
        .bind(provider_id)
        .bind(active_only)
        .fetch_all(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("find provider connections", e))?;

        Ok(into_models(rows))
    }

    async fn update_tokens(&self, connection_id: Uuid, update: TokenUpdate) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE calendar_connections
            SET access_token = $1,
                refresh_token = COALESCE($2, refresh_token),
                token_expires_at = $3,
                updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(&update.access_token)
        .bind(&update.refresh_token)
        .bind(update.expires_at)
        .bind(Utc::now())
        .bind(connection_id)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("update tokens", e))?;

        debug!("Tokens updated for connection {}", connection_id);
        Ok(())
    }

    async fn mark_reauth_required(&self, connection_id: Uuid) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE calendar_connections
            SET is_active = 0, reauth_required = 1, updated_at = $1
            WHERE id = $2
            "#,
        )
        .bind(Utc::now())
        .bind(connection_id)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("deactivate connection", e))?;

        warn!("Connection {} deactivated, reauthentication required", connection_id);
        Ok(())
    }

    async fn mark_synced(&self, connection_id: Uuid, at: DateTime<Utc>) -> Result<(), DbError> {
        sqlx::query("UPDATE calendar_connections SET last_sync_at = $1 WHERE id = $2")
            .bind(at)
            .bind(connection_id)
            .execute(self.db_client.pool())
            .await
            .map_err(|e| DbError::query("record sync watermark", e))?;
        Ok(())
    }

    async fn set_default_for_bookings(
        &self,
        provider_id: Uuid,
        connection_id: Uuid,
    ) -> Result<bool, DbError> {
        let mut tx = self.db_client.begin().await?;

        sqlx::query(
            "UPDATE calendar_connections SET is_default_for_bookings = 0 WHERE provider_id = $1",
        )
        .bind(provider_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::query("clear default connection", e))?;

        let result = sqlx::query(
            r#"
            UPDATE calendar_connections SET is_default_for_bookings = 1
            WHERE id = $1 AND provider_id = $2
            "#,
        )
        .bind(connection_id)
        .bind(provider_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::query("set default connection", e))?;

        if result.rows_affected() == 0 {
            // unknown connection: keep the previous default
            tx.rollback()
                .await
                .map_err(|e| DbError::TransactionError(e.to_string()))?;
            return Ok(false);
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionError(e.to_string()))?;
        Ok(true)
    }

    async fn delete_connection(
        &self,
        provider_id: Uuid,
        connection_id: Uuid,
    ) -> Result<bool, DbError> {
        let result =
            sqlx::query("DELETE FROM calendar_connections WHERE id = $1 AND provider_id = $2")
                .bind(connection_id)
                .bind(provider_id)
                .execute(self.db_client.pool())
                .await
                .map_err(|e| DbError::query("delete connection", e))?;

        Ok(result.rows_affected() > 0)
    }
}
