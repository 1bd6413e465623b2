//! Local cache of remote calendar events.
//!
//! Events are keyed by `(connection_id, remote_event_id)`. Sync writes only the remote
//! content columns; `allow_bookings` and `max_bookings` belong to the provider and survive
//! every re-sync.

use crate::error::DbError;
use crate::DbClient;
use bookify_common::models::CalendarEvent;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct DbCalendarEvent {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub provider_id: Uuid,
    pub remote_calendar_id: String,
    pub remote_event_id: String,
    pub title: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    pub allow_bookings: bool,
    pub max_bookings: i64,
    pub synced_at: DateTime<Utc>,
}

impl From<DbCalendarEvent> for CalendarEvent {
    fn from(db: DbCalendarEvent) -> Self {
        Self {
            id: db.id,
            connection_id: db.connection_id,
            provider_id: db.provider_id,
            remote_calendar_id: db.remote_calendar_id,
            remote_event_id: db.remote_event_id,
            title: db.title,
            location: db.location,
            start_time: db.start_time,
            end_time: db.end_time,
            is_all_day: db.is_all_day,
            allow_bookings: db.allow_bookings,
            max_bookings: db.max_bookings,
            synced_at: db.synced_at,
        }
    }
}

/// Remote content of one event as written by sync.
#[derive(Debug, Clone, PartialEq)]
pub struct EventUpsert {
    pub remote_event_id: String,
    pub title: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
}

/// Which cached events a sync pass is allowed to remove.
#[derive(Debug, Clone)]
pub struct PruneScope<'a> {
    pub connection_id: Uuid,
    pub remote_calendar_id: &'a str,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// Repository for cached calendar events
pub trait CalendarEventRepository {
    /// Inserts new events and updates changed ones. Returns how many rows were written;
    /// unchanged events are not touched.
    fn upsert_events(
        &self,
        provider_id: Uuid,
        connection_id: Uuid,
        remote_calendar_id: &str,
        events: &[EventUpsert],
        synced_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, DbError>> + Send;

    /// Deletes cached events inside `scope` whose remote id is not in `keep`.
    fn prune_missing(
        &self,
        scope: PruneScope<'_>,
        keep: &HashSet<String>,
    ) -> impl std::future::Future<Output = Result<u64, DbError>> + Send;

    /// Events of a provider overlapping `[start, end)`.
    fn find_for_provider_in_range(
        &self,
        provider_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<CalendarEvent>, DbError>> + Send;

    fn find_event(
        &self,
        provider_id: Uuid,
        event_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<CalendarEvent>, DbError>> + Send;

    /// Provider-side booking policy of one event.
    fn set_booking_policy(
        &self,
        provider_id: Uuid,
        event_id: Uuid,
        allow_bookings: bool,
        max_bookings: i64,
    ) -> impl std::future::Future<Output = Result<bool, DbError>> + Send;

    fn count_for_connection(
        &self,
        connection_id: Uuid,
    ) -> impl std::future::Future<Output = Result<i64, DbError>> + Send;
}

/// SQL implementation of the calendar event repository
#[derive(Debug, Clone)]
pub struct SqlCalendarEventRepository {
    db_client: DbClient,
}

impl SqlCalendarEventRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }
}

const UPSERT_EVENT: &str = r#"
    INSERT INTO calendar_events (
        id, connection_id, provider_id, remote_calendar_id, remote_event_id, title, location,
        start_time, end_time, is_all_day, allow_bookings, max_bookings, synced_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, 1, $11)
    ON CONFLICT(connection_id, remote_event_id) DO UPDATE SET
        remote_calendar_id = excluded.remote_calendar_id,
        title = excluded.title,
        location = excluded.location,
        start_time = excluded.start_time,
        end_time = excluded.end_time,
        is_all_day = excluded.is_all_day,
        synced_at = excluded.synced_at
    WHERE calendar_events.remote_calendar_id IS NOT excluded.remote_calendar_id
       OR calendar_events.title IS NOT excluded.title
       OR calendar_events.location IS NOT excluded.location
       OR calendar_events.start_time IS NOT excluded.start_time
       OR calendar_events.end_time IS NOT excluded.end_time
       OR calendar_events.is_all_day IS NOT excluded.is_all_day
"#;

impl CalendarEventRepository for SqlCalendarEventRepository {
    async fn upsert_events(
        &self,
        provider_id: Uuid,
        connection_id: Uuid,
        remote_calendar_id: &str,
        events: &[EventUpsert],
        synced_at: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.db_client.begin().await?;
        let mut written = 0;
        for event in events {
            let result = sqlx::query(UPSERT_EVENT)
                .bind(Uuid::new_v4())
                .bind(connection_id)
                .bind(provider_id)
                .bind(remote_calendar_id)
                .bind(&event.remote_event_id)
                .bind(&event.title)
                .bind(&event.location)
                .bind(event.start_time)
                .bind(event.end_time)
                .bind(event.is_all_day)
                .bind(synced_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::query("upsert calendar event", e))?;
            written += result.rows_affected();
        }
        tx.commit()
            .await
            .map_err(|e| DbError::TransactionError(e.to_string()))?;

        debug!(
            "Upserted {} events for connection {} calendar {}, {} changed",
            events.len(),
            connection_id,
            remote_calendar_id,
            written
        );
        Ok(written)
    }

    async fn prune_missing(
        &self,
        scope: PruneScope<'_>,
        keep: &HashSet<String>,
    ) -> Result<u64, DbError> {
        let mut tx = self.db_client.begin().await?;

        let in_scope: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT id, remote_event_id FROM calendar_events
            WHERE connection_id = $1 AND remote_calendar_id = $2
              AND start_time < $3 AND end_time > $4
            "#,
        )
        .bind(scope.connection_id)
        .bind(scope.remote_calendar_id)
        .bind(scope.window_end)
        .bind(scope.window_start)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| DbError::query("load events for pruning", e))?;

        let mut removed = 0;
        for (id, remote_event_id) in in_scope {
            if keep.contains(&remote_event_id) {
                continue;
            }
            let result = sqlx::query("DELETE FROM calendar_events WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::query("prune calendar event", e))?;
            removed += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionError(e.to_string()))?;

        if removed > 0 {
            info!(
                "Pruned {} events no longer present in calendar {} of connection {}",
                removed, scope.remote_calendar_id, scope.connection_id
            );
        }
        Ok(removed)
    }

    async fn find_for_provider_in_range(
        &self,
        provider_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, DbError> {
        let rows = sqlx::query_as::<_, DbCalendarEvent>(
            r#"
            SELECT * FROM calendar_events
            WHERE provider_id = $1 AND start_time < $2 AND end_time > $3
            ORDER BY start_time
            "#,
        )
        .bind(provider_id)
        .bind(end)
        .bind(start)
        .fetch_all(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("find events in range", e))?;

        Ok(rows.into_iter().map(CalendarEvent::from).collect())
    }

    async fn find_event(
        &self,
        provider_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<CalendarEvent>, DbError> {
        let row = sqlx::query_as::<_, DbCalendarEvent>(
            "SELECT * FROM calendar_events WHERE id = $1 AND provider_id = $2",
        )
        .bind(event_id)
        .bind(provider_id)
        .fetch_optional(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("find calendar event", e))?;

        Ok(row.map(CalendarEvent::from))
    }

    async fn set_booking_policy(
        &self,
        provider_id: Uuid,
        event_id: Uuid,
        allow_bookings: bool,
        max_bookings: i64,
    ) -> Result<bool, DbError> {
        if max_bookings < 1 {
            return Err(DbError::InvalidData(format!(
                "max_bookings must be at least 1, got {}",
                max_bookings
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE calendar_events SET allow_bookings = $1, max_bookings = $2
            WHERE id = $3 AND provider_id = $4
            "#,
        )
        .bind(allow_bookings)
        .bind(max_bookings)
        .bind(event_id)
        .bind(provider_id)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("set event booking policy", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_for_connection(&self, connection_id: Uuid) -> Result<i64, DbError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM calendar_events WHERE connection_id = $1")
                .bind(connection_id)
                .fetch_one(self.db_client.pool())
                .await
                .map_err(|e| DbError::query("count calendar events", e))?;
        Ok(count)
    }
}
