// --- File: crates/bookify_booking/src/guard.rs ---

//! Final admission check for bookings.
//!
//! Every operation runs in one sqlx transaction whose first statement is a write: the customer
//! upsert when booking, the guarded status change when cancelling or rescheduling. SQLite then
//! holds the write lock before anything is read, so concurrent writers wait on `busy_timeout`
//! instead of failing to upgrade a read snapshot, and attempts on the last seat queue behind
//! each other until exactly one of them sees the seat free. Slot bookings re-check the
//! provider's buffer under that lock. Notifications go out after commit and never fail the
//! booking.

use std::sync::Arc;

use bookify_availability::AvailabilityResolver;
use bookify_common::models::{local_to_utc, Booking, BookingStatus, Customer};
use bookify_common::services::{BookingNotice, BoxedError, NotificationService};
use bookify_db::repositories::booking::tx::{self, CustomerInput};
use bookify_db::{DbClient, DbError, DbTransaction};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::BookingError;

pub type Notifier = Arc<dyn NotificationService<Error = BoxedError>>;

/// Who is booking. Matched to an existing customer by e-mail.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
}

impl CustomerDetails {
    fn validate(&self) -> Result<(), BookingError> {
        let email = self.email.trim();
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed {
            return Err(BookingError::InvalidInput(format!(
                "invalid customer email {:?}",
                self.email
            )));
        }
        Ok(())
    }

    fn as_input(&self) -> CustomerInput<'_> {
        CustomerInput {
            email: &self.email,
            name: self.name.as_deref(),
            phone: self.phone.as_deref(),
        }
    }
}

/// Booking against a cached appointment event.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub provider_id: Uuid,
    pub calendar_event_id: Uuid,
    pub customer: CustomerDetails,
    pub service_type: Option<String>,
    pub notes: Option<String>,
}

/// Booking of a template slot that has no calendar event behind it.
#[derive(Debug, Clone)]
pub struct NewSlotBooking {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// Defaults to the provider's default duration.
    pub duration_minutes: Option<i64>,
    pub location_id: Option<Uuid>,
    pub customer: CustomerDetails,
    pub service_type: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum NoticeKind {
    Confirmed,
    Rescheduled,
    Cancelled,
}

#[derive(Clone)]
pub struct BookingGuard {
    db: DbClient,
    resolver: AvailabilityResolver,
    notifier: Notifier,
}

impl BookingGuard {
    pub fn new(db: DbClient, resolver: AvailabilityResolver, notifier: Notifier) -> Self {
        Self {
            db,
            resolver,
            notifier,
        }
    }

    pub async fn create_booking(&self, request: NewBooking) -> Result<Booking, BookingError> {
        request.customer.validate()?;

        let mut conn = self.db.begin().await?;
        let customer = tx::upsert_customer(&mut conn, request.customer.as_input()).await?;

        let event = tx::find_event(&mut conn, request.provider_id, request.calendar_event_id)
            .await?
            .ok_or(BookingError::EventNotFound(request.calendar_event_id))?;
        if !event.allow_bookings {
            return Err(BookingError::BookingsDisabled(event.id));
        }
        if event.start_time <= Utc::now() {
            return Err(BookingError::SlotUnavailable(format!(
                "event {} has already started",
                event.id
            )));
        }

        let booked = tx::count_active_bookings(&mut conn, event.id).await?;
        if booked >= event.max_bookings {
            debug!(
                event_id = %event.id,
                "Event full: {}/{} booked",
                booked,
                event.max_bookings
            );
            return Err(BookingError::SlotUnavailable(format!(
                "event {} is fully booked",
                event.id
            )));
        }

        let booking = new_booking(
            request.provider_id,
            customer.id,
            Some(event.id),
            event.start_time,
            event.duration_minutes(),
            request.service_type,
            request.notes,
        );
        if !tx::insert_booking_within_capacity(&mut conn, &booking, event.max_bookings).await? {
            return Err(BookingError::SlotUnavailable(format!(
                "event {} is fully booked",
                event.id
            )));
        }
        commit(conn).await?;

        info!(
            booking_id = %booking.id,
            provider_id = %booking.provider_id,
            "Booked event {} ({}/{})",
            event.id,
            booked + 1,
            event.max_bookings
        );
        self.notify(NoticeKind::Confirmed, notice(&booking, &customer));
        Ok(booking)
    }

    pub async fn create_slot_booking(
        &self,
        request: NewSlotBooking,
    ) -> Result<Booking, BookingError> {
        request.customer.validate()?;

        let provider = self.resolver.provider(request.provider_id).await?;
        let duration = request
            .duration_minutes
            .unwrap_or(provider.default_duration_minutes);
        if !provider.allows_duration(duration) {
            return Err(BookingError::InvalidInput(format!(
                "duration {} is not offered by this provider",
                duration
            )));
        }

        let open = self
            .resolver
            .is_available(
                provider.id,
                request.date,
                request.start_time,
                duration,
                request.location_id,
            )
            .await?;
        if !open {
            return Err(BookingError::SlotUnavailable(format!(
                "{} {} is not open",
                request.date, request.start_time
            )));
        }

        let tz = self.resolver.time_zone_of(&provider);
        let start = local_to_utc(tz, request.date.and_time(request.start_time));

        let mut conn = self.db.begin().await?;
        let customer = tx::upsert_customer(&mut conn, request.customer.as_input()).await?;
        let booking = new_booking(
            provider.id,
            customer.id,
            None,
            start,
            duration,
            request.service_type,
            request.notes,
        );
        // someone may have taken it between the availability check and now
        if !tx::insert_booking_if_free(&mut conn, &booking, None).await? {
            return Err(BookingError::SlotUnavailable(format!(
                "{} {} was just booked",
                request.date, request.start_time
            )));
        }
        commit(conn).await?;

        info!(
            booking_id = %booking.id,
            provider_id = %provider.id,
            "Booked slot {} {} ({} min)",
            request.date,
            request.start_time,
            duration
        );
        self.notify(NoticeKind::Confirmed, notice(&booking, &customer));
        Ok(booking)
    }

    /// Cancels an active booking of `provider_id`, freeing its capacity.
    pub async fn cancel_booking(
        &self,
        provider_id: Uuid,
        booking_id: Uuid,
    ) -> Result<Booking, BookingError> {
        let mut conn = self.db.begin().await?;
        let cancelled =
            tx::update_status(&mut conn, provider_id, booking_id, BookingStatus::Cancelled)
                .await?;
        let booking = tx::find_booking(&mut conn, provider_id, booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;
        if !cancelled {
            return Err(not_active(&booking));
        }
        let customer = tx::find_customer(&mut conn, booking.customer_id).await?;
        commit(conn).await?;

        info!(booking_id = %booking.id, provider_id = %provider_id, "Booking cancelled");
        if let Some(customer) = customer {
            self.notify(NoticeKind::Cancelled, notice(&booking, &customer));
        }
        Ok(booking)
    }

    /// Moves an active booking to another appointment event.
    ///
    /// The old booking becomes `Rescheduled` and the returned one points back at it.
    pub async fn reschedule_booking(
        &self,
        provider_id: Uuid,
        booking_id: Uuid,
        new_event_id: Uuid,
    ) -> Result<Booking, BookingError> {
        let mut conn = self.db.begin().await?;
        let moved =
            tx::update_status(&mut conn, provider_id, booking_id, BookingStatus::Rescheduled)
                .await?;
        let previous = tx::find_booking(&mut conn, provider_id, booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;
        if !moved {
            return Err(not_active(&previous));
        }
        if previous.calendar_event_id == Some(new_event_id) {
            return Err(BookingError::InvalidInput(
                "booking is already on that event".to_string(),
            ));
        }

        let event = tx::find_event(&mut conn, provider_id, new_event_id)
            .await?
            .ok_or(BookingError::EventNotFound(new_event_id))?;
        if !event.allow_bookings {
            return Err(BookingError::BookingsDisabled(event.id));
        }
        if event.start_time <= Utc::now() {
            return Err(BookingError::SlotUnavailable(format!(
                "event {} has already started",
                event.id
            )));
        }

        let mut booking = new_booking(
            provider_id,
            previous.customer_id,
            Some(event.id),
            event.start_time,
            event.duration_minutes(),
            previous.service_type.clone(),
            previous.notes.clone(),
        );
        booking.rescheduled_from = Some(previous.id);
        if !tx::insert_booking_within_capacity(&mut conn, &booking, event.max_bookings).await? {
            return Err(BookingError::SlotUnavailable(format!(
                "event {} is fully booked",
                event.id
            )));
        }
        let customer = tx::find_customer(&mut conn, booking.customer_id).await?;
        commit(conn).await?;

        info!(
            booking_id = %booking.id,
            provider_id = %provider_id,
            "Booking {} moved to event {}",
            previous.id,
            event.id
        );
        if let Some(customer) = customer {
            self.notify(NoticeKind::Rescheduled, notice(&booking, &customer));
        }
        Ok(booking)
    }

    fn notify(&self, kind: NoticeKind, notice: BookingNotice) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let booking_id = notice.booking_id;
            let result = match kind {
                NoticeKind::Confirmed => notifier.booking_confirmed(notice).await,
                NoticeKind::Rescheduled => notifier.booking_rescheduled(notice).await,
                NoticeKind::Cancelled => notifier.booking_cancelled(notice).await,
            };
            if let Err(e) = result {
                warn!(booking_id = %booking_id, "{:?} notification failed: {}", kind, e);
            }
        });
    }
}

async fn commit(conn: DbTransaction) -> Result<(), DbError> {
    conn.commit()
        .await
        .map_err(|e| DbError::TransactionError(e.to_string()))
}

fn not_active(booking: &Booking) -> BookingError {
    BookingError::InvalidInput(format!(
        "booking {} is {}",
        booking.id,
        booking.status.as_str().to_lowercase()
    ))
}

fn new_booking(
    provider_id: Uuid,
    customer_id: Uuid,
    calendar_event_id: Option<Uuid>,
    start_time: DateTime<Utc>,
    duration_minutes: i64,
    service_type: Option<String>,
    notes: Option<String>,
) -> Booking {
    let now = Utc::now();
    Booking {
        id: Uuid::new_v4(),
        provider_id,
        customer_id,
        calendar_event_id,
        start_time,
        duration_minutes,
        status: BookingStatus::Confirmed,
        service_type,
        notes,
        rescheduled_from: None,
        created_at: now,
        updated_at: now,
    }
}

fn notice(booking: &Booking, customer: &Customer) -> BookingNotice {
    BookingNotice {
        booking_id: booking.id,
        provider_id: booking.provider_id,
        customer_email: customer.email.clone(),
        customer_name: customer.name.clone(),
        start_time: booking.start_time,
        duration_minutes: booking.duration_minutes,
        service_type: booking.service_type.clone(),
        previous_booking_id: booking.rescheduled_from,
    }
}
