//! Repository for providers and their locations

use crate::error::DbError;
use crate::DbClient;
use bookify_common::models::{LocationSchedule, Provider, ProviderLocation};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct DbProvider {
    pub id: Uuid,
    pub name: String,
    pub time_zone: String,
    pub default_duration_minutes: i64,
    pub buffer_minutes: i64,
    pub advance_booking_days: i64,
    pub allowed_durations: Json<Vec<i64>>,
    pub created_at: DateTime<Utc>,
}

impl From<DbProvider> for Provider {
    fn from(db: DbProvider) -> Self {
        Self {
            id: db.id,
            name: db.name,
            time_zone: db.time_zone,
            default_duration_minutes: db.default_duration_minutes,
            buffer_minutes: db.buffer_minutes,
            advance_booking_days: db.advance_booking_days,
            allowed_durations: db.allowed_durations.0,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbLocationSchedule {
    pub id: Uuid,
    pub location_id: Uuid,
    pub day_of_week: Option<i64>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: String,
    pub end_time: String,
    pub enabled: bool,
}

impl From<DbLocationSchedule> for LocationSchedule {
    fn from(db: DbLocationSchedule) -> Self {
        Self {
            id: db.id,
            location_id: db.location_id,
            day_of_week: db.day_of_week.and_then(|d| u8::try_from(d).ok()),
            specific_date: db.specific_date,
            start_time: db.start_time,
            end_time: db.end_time,
            enabled: db.enabled,
        }
    }
}

/// Repository for providers, the root aggregate.
pub trait ProviderRepository {
    fn create_provider(
        &self,
        provider: Provider,
    ) -> impl std::future::Future<Output = Result<Provider, DbError>> + Send;

    fn find_provider(
        &self,
        provider_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Provider>, DbError>> + Send;

    /// Deletes the provider and, through cascades, everything it owns.
    fn delete_provider(
        &self,
        provider_id: Uuid,
    ) -> impl std::future::Future<Output = Result<bool, DbError>> + Send;

    fn create_location(
        &self,
        location: ProviderLocation,
    ) -> impl std::future::Future<Output = Result<ProviderLocation, DbError>> + Send;

    fn add_location_schedule(
        &self,
        schedule: LocationSchedule,
    ) -> impl std::future::Future<Output = Result<LocationSchedule, DbError>> + Send;

    /// Schedules of a location, only if the location belongs to `provider_id`.
    fn find_location_schedules(
        &self,
        provider_id: Uuid,
        location_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Vec<LocationSchedule>>, DbError>> + Send;
}

/// SQL implementation of the provider repository
#[derive(Debug, Clone)]
pub struct SqlProviderRepository {
    db_client: DbClient,
}

impl SqlProviderRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }
}

impl ProviderRepository for SqlProviderRepository {
    async fn create_provider(&self, provider: Provider) -> Result<Provider, DbError> {
        debug!("Creating provider {}", provider.id);

        sqlx::query(
            r#"
            INSERT INTO providers (id, name, time_zone, default_duration_minutes, buffer_minutes,
                                   advance_booking_days, allowed_durations, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(provider.id)
        .bind(&provider.name)
        .bind(&provider.time_zone)
        .bind(provider.default_duration_minutes)
        .bind(provider.buffer_minutes)
        .bind(provider.advance_booking_days)
        .bind(Json(&provider.allowed_durations))
        .bind(provider.created_at)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("insert provider", e))?;

        info!("Provider {} created", provider.id);
        Ok(provider)
    }

    async fn find_provider(&self, provider_id: Uuid) -> Result<Option<Provider>, DbError> {
        let row = sqlx::query_as::<_, DbProvider>("SELECT * FROM providers WHERE id = $1")
            .bind(provider_id)
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| DbError::query("find provider", e))?;

        Ok(row.map(Provider::from))
    }

    async fn delete_provider(&self, provider_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM providers WHERE id = $1")
            .bind(provider_id)
            .execute(self.db_client.pool())
            .await
            .map_err(|e| DbError::query("delete provider", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_location(
        &self,
        location: ProviderLocation,
    ) -> Result<ProviderLocation, DbError> {
        sqlx::query(
            "INSERT INTO provider_locations (id, provider_id, name, address) VALUES ($1, $2, $3, $4)",
        )
        .bind(location.id)
        .bind(location.provider_id)
        .bind(&location.name)
        .bind(&location.address)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("insert location", e))?;

        Ok(location)
    }

    async fn add_location_schedule(
        &self,
        schedule: LocationSchedule,
    ) -> Result<LocationSchedule, DbError> {
        sqlx::query(
            r#"
            INSERT INTO location_schedules (id, location_id, day_of_week, specific_date,
                                            start_time, end_time, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.location_id)
        .bind(schedule.day_of_week.map(i64::from))
        .bind(schedule.specific_date)
        .bind(&schedule.start_time)
        .bind(&schedule.end_time)
        .bind(schedule.enabled)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("insert location schedule", e))?;

        Ok(schedule)
    }

    async fn find_location_schedules(
        &self,
        provider_id: Uuid,
        location_id: Uuid,
    ) -> Result<Option<Vec<LocationSchedule>>, DbError> {
        let owned: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM provider_locations WHERE id = $1 AND provider_id = $2")
                .bind(location_id)
                .bind(provider_id)
                .fetch_optional(self.db_client.pool())
                .await
                .map_err(|e| DbError::query("find location", e))?;
        if owned.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query_as::<_, DbLocationSchedule>(
            "SELECT * FROM location_schedules WHERE location_id = $1",
        )
        .bind(location_id)
        .fetch_all(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("find location schedules", e))?;

        Ok(Some(rows.into_iter().map(LocationSchedule::from).collect()))
    }
}
