//! Repository for customers and bookings
//!
//! Reads go through [`SqlBookingRepository`]. The capacity-checked writes live in [`tx`]:
//! they take an open connection so the booking guard can run them inside one transaction.

use crate::error::DbError;
use crate::DbClient;
use bookify_common::models::{Booking, BookingStatus, Customer};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct DbBooking {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub customer_id: Uuid,
    pub calendar_event_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: String,
    pub service_type: Option<String>,
    pub notes: Option<String>,
    pub rescheduled_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbBooking> for Booking {
    type Error = DbError;

    fn try_from(db: DbBooking) -> Result<Self, Self::Error> {
        let status = db
            .status
            .parse::<BookingStatus>()
            .map_err(DbError::InvalidData)?;
        Ok(Self {
            id: db.id,
            provider_id: db.provider_id,
            customer_id: db.customer_id,
            calendar_event_id: db.calendar_event_id,
            start_time: db.start_time,
            duration_minutes: db.duration_minutes,
            status,
            service_type: db.service_type,
            notes: db.notes,
            rescheduled_from: db.rescheduled_from,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCustomer {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbCustomer> for Customer {
    fn from(db: DbCustomer) -> Self {
        Self {
            id: db.id,
            email: db.email,
            name: db.name,
            phone: db.phone,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

const ACTIVE_STATUSES: &str = "('PENDING', 'CONFIRMED')";

/// Read side of bookings
pub trait BookingRepository {
    fn find_booking(
        &self,
        provider_id: Uuid,
        booking_id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Booking>, DbError>> + Send;

    /// Active bookings of a provider starting before `end` and ending after `start`.
    fn find_active_in_range(
        &self,
        provider_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<Booking>, DbError>> + Send;

    /// Active booking count per linked calendar event.
    fn active_counts_by_event(
        &self,
        provider_id: Uuid,
    ) -> impl std::future::Future<Output = Result<HashMap<Uuid, i64>, DbError>> + Send;
}

/// SQL implementation of the booking repository
#[derive(Debug, Clone)]
pub struct SqlBookingRepository {
    db_client: DbClient,
}

impl SqlBookingRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }
}

impl BookingRepository for SqlBookingRepository {
    async fn find_booking(
        &self,
        provider_id: Uuid,
        booking_id: Uuid,
    ) -> Result<Option<Booking>, DbError> {
        let row = sqlx::query_as::<_, DbBooking>(
            "SELECT * FROM bookings WHERE id = $1 AND provider_id = $2",
        )
        .bind(booking_id)
        .bind(provider_id)
        .fetch_optional(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("find booking", e))?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_active_in_range(
        &self,
        provider_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, DbError> {
        // The end is derived, so widen the start bound by a day and filter precisely below.
        let rows = sqlx::query_as::<_, DbBooking>(&format!(
            r#"
            SELECT * FROM bookings
            WHERE provider_id = $1 AND status IN {} AND start_time < $2 AND start_time >= $3
            ORDER BY start_time
            "#,
            ACTIVE_STATUSES
        ))
        .bind(provider_id)
        .bind(end)
        .bind(start - chrono::Duration::days(1))
        .fetch_all(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("find active bookings", e))?;

        let bookings = rows
            .into_iter()
            .map(Booking::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bookings
            .into_iter()
            .filter(|b| b.end_time() > start)
            .collect())
    }

    async fn active_counts_by_event(
        &self,
        provider_id: Uuid,
    ) -> Result<HashMap<Uuid, i64>, DbError> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(&format!(
            r#"
            SELECT calendar_event_id, COUNT(*) FROM bookings
            WHERE provider_id = $1 AND calendar_event_id IS NOT NULL AND status IN {}
            GROUP BY calendar_event_id
            "#,
            ACTIVE_STATUSES
        ))
        .bind(provider_id)
        .fetch_all(self.db_client.pool())
        .await
        .map_err(|e| DbError::query("count active bookings", e))?;

        Ok(rows.into_iter().collect())
    }
}

/// Statements run on a connection the caller holds, usually an open transaction.
///
/// None of these touch the pool: with a single-connection pool that would wait on itself.
pub mod tx {
    use super::*;
    use chrono::Duration;
    use sqlx::SqliteConnection;

    /// Customer identity for a booking. Emails are matched case-insensitively.
    #[derive(Debug, Clone)]
    pub struct CustomerInput<'a> {
        pub email: &'a str,
        pub name: Option<&'a str>,
        pub phone: Option<&'a str>,
    }

    /// Finds or creates the customer by email and refreshes name and phone when given.
    pub async fn upsert_customer(
        conn: &mut SqliteConnection,
        input: CustomerInput<'_>,
    ) -> Result<Customer, DbError> {
        let email = input.email.trim().to_lowercase();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO customers (id, email, name, phone, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT(email) DO UPDATE SET
                name = COALESCE(excluded.name, customers.name),
                phone = COALESCE(excluded.phone, customers.phone),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(input.name)
        .bind(input.phone)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::query("upsert customer", e))?;

        let row = sqlx::query_as::<_, DbCustomer>("SELECT * FROM customers WHERE email = $1")
            .bind(&email)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| DbError::query("load customer", e))?;
        Ok(row.into())
    }

    pub async fn find_customer(
        conn: &mut SqliteConnection,
        customer_id: Uuid,
    ) -> Result<Option<Customer>, DbError> {
        let row = sqlx::query_as::<_, DbCustomer>("SELECT * FROM customers WHERE id = $1")
            .bind(customer_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| DbError::query("find customer", e))?;
        Ok(row.map(Customer::from))
    }

    /// Event lookup scoped to the provider.
    pub async fn find_event(
        conn: &mut SqliteConnection,
        provider_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<bookify_common::models::CalendarEvent>, DbError> {
        let row = sqlx::query_as::<_, crate::repositories::calendar_event::DbCalendarEvent>(
            "SELECT * FROM calendar_events WHERE id = $1 AND provider_id = $2",
        )
        .bind(event_id)
        .bind(provider_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| DbError::query("find calendar event", e))?;
        Ok(row.map(Into::into))
    }

    pub async fn count_active_bookings(
        conn: &mut SqliteConnection,
        event_id: Uuid,
    ) -> Result<i64, DbError> {
        let (count,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM bookings WHERE calendar_event_id = $1 AND status IN {}",
            ACTIVE_STATUSES
        ))
        .bind(event_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| DbError::query("count event bookings", e))?;
        Ok(count)
    }

    /// Inserts `booking` only while its event has fewer than `max_bookings` active bookings.
    /// Returns `false` when the capacity was already taken.
    pub async fn insert_booking_within_capacity(
        conn: &mut SqliteConnection,
        booking: &Booking,
        max_bookings: i64,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO bookings (id, provider_id, customer_id, calendar_event_id, start_time,
                                  duration_minutes, status, service_type, notes, rescheduled_from,
                                  created_at, updated_at)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11
            WHERE (SELECT COUNT(*) FROM bookings
                   WHERE calendar_event_id = $4 AND status IN {}) < $12
            "#,
            ACTIVE_STATUSES
        ))
        .bind(booking.id)
        .bind(booking.provider_id)
        .bind(booking.customer_id)
        .bind(booking.calendar_event_id)
        .bind(booking.start_time)
        .bind(booking.duration_minutes)
        .bind(booking.status.as_str())
        .bind(&booking.service_type)
        .bind(&booking.notes)
        .bind(booking.rescheduled_from)
        .bind(booking.created_at)
        .bind(max_bookings)
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::query("insert booking", e))?;

        Ok(result.rows_affected() == 1)
    }

    /// Inserts an unlinked booking only when it keeps the provider's buffer to every other
    /// active unlinked booking. Bookings on appointment events are bounded by event capacity
    /// instead. `exclude` skips one booking, the one being rescheduled.
    pub async fn insert_booking_if_free(
        conn: &mut SqliteConnection,
        booking: &Booking,
        exclude: Option<Uuid>,
    ) -> Result<bool, DbError> {
        let buffer_minutes: Option<(i64,)> =
            sqlx::query_as("SELECT buffer_minutes FROM providers WHERE id = $1")
                .bind(booking.provider_id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| DbError::query("load provider buffer", e))?;
        let buffer = Duration::minutes(buffer_minutes.map_or(0, |(m,)| m.max(0)));
        let start = booking.start_time - buffer;
        let end = booking.end_time() + buffer;

        let candidates = sqlx::query_as::<_, DbBooking>(&format!(
            r#"
            SELECT * FROM bookings
            WHERE provider_id = $1 AND calendar_event_id IS NULL AND status IN {}
              AND start_time < $2 AND start_time >= $3
            "#,
            ACTIVE_STATUSES
        ))
        .bind(booking.provider_id)
        .bind(end)
        .bind(start - Duration::days(1))
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DbError::query("load overlapping bookings", e))?;

        for row in candidates {
            if Some(row.id) == exclude {
                continue;
            }
            let existing = Booking::try_from(row)?;
            if existing.start_time < end && existing.end_time() > start {
                return Ok(false);
            }
        }

        insert_booking(conn, booking).await?;
        Ok(true)
    }

    pub async fn insert_booking(
        conn: &mut SqliteConnection,
        booking: &Booking,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, provider_id, customer_id, calendar_event_id, start_time,
                                  duration_minutes, status, service_type, notes, rescheduled_from,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            "#,
        )
        .bind(booking.id)
        .bind(booking.provider_id)
        .bind(booking.customer_id)
        .bind(booking.calendar_event_id)
        .bind(booking.start_time)
        .bind(booking.duration_minutes)
        .bind(booking.status.as_str())
        .bind(&booking.service_type)
        .bind(&booking.notes)
        .bind(booking.rescheduled_from)
        .bind(booking.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::query("insert booking", e))?;
        Ok(())
    }

    pub async fn find_booking(
        conn: &mut SqliteConnection,
        provider_id: Uuid,
        booking_id: Uuid,
    ) -> Result<Option<Booking>, DbError> {
        let row = sqlx::query_as::<_, DbBooking>(
            "SELECT * FROM bookings WHERE id = $1 AND provider_id = $2",
        )
        .bind(booking_id)
        .bind(provider_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| DbError::query("find booking", e))?;
        row.map(Booking::try_from).transpose()
    }

    /// Moves an active booking of `provider_id` to `status`. Returns `false` if no such
    /// booking is active.
    ///
    /// Being a write, this can open a transaction: SQLite then takes the write lock up front
    /// instead of failing to upgrade a read snapshot later.
    pub async fn update_status(
        conn: &mut SqliteConnection,
        provider_id: Uuid,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE bookings SET status = $1, updated_at = $2
            WHERE id = $3 AND provider_id = $4 AND status IN {}
            "#,
            ACTIVE_STATUSES
        ))
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(booking_id)
        .bind(provider_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::query("update booking status", e))?;
        Ok(result.rows_affected() == 1)
    }
}
