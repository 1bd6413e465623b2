// --- File: crates/bookify_availability/src/resolver.rs ---

//! Turns templates, cached calendar events and bookings into bookable slots.
//!
//! The `*_at` variants take "now" explicitly; the plain ones use the wall clock.

use std::collections::HashSet;
use std::str::FromStr;

use bookify_common::models::{local_day_bounds, local_minute_to_utc, local_to_utc, Provider};
use bookify_config::AppConfig;
use bookify_db::repositories::{
    BookingRepository, CalendarEventRepository, ConnectionRepository, ProviderRepository,
    Repositories,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AvailabilityError;
use crate::slots::{candidate_slots, fits, intersect, subtract_busy, Interval, Slot};
use crate::templates::{get_effective_availability_for_date, TemplateEngine};

const MAX_DURATION_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone)]
pub struct AvailabilityResolver {
    repos: Repositories,
    templates: TemplateEngine,
    step: Duration,
    default_tz: Tz,
}

impl AvailabilityResolver {
    pub fn new(repos: Repositories, config: &AppConfig) -> Self {
        let templates = TemplateEngine::new(repos.templates.clone(), repos.providers.clone());
        let default_tz = Tz::from_str(&config.scheduling.default_time_zone).unwrap_or(Tz::UTC);
        Self {
            repos,
            templates,
            step: Duration::minutes(config.scheduling.slot_step_minutes.max(1)),
            default_tz,
        }
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// The zone `provider` works in, falling back to the configured default.
    pub fn time_zone_of(&self, provider: &Provider) -> Tz {
        provider.tz_or(self.default_tz)
    }

    pub async fn provider(&self, provider_id: Uuid) -> Result<Provider, AvailabilityError> {
        self.repos
            .providers
            .find_provider(provider_id)
            .await?
            .ok_or(AvailabilityError::ProviderNotFound(provider_id))
    }

    pub async fn get_available_slots(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        duration_minutes: i64,
        location_id: Option<Uuid>,
    ) -> Result<Vec<Slot>, AvailabilityError> {
        self.get_available_slots_at(provider_id, date, duration_minutes, location_id, Utc::now())
            .await
    }

    pub async fn get_available_slots_at(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        duration_minutes: i64,
        location_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, AvailabilityError> {
        let duration = checked_duration(duration_minutes)?;
        let provider = self.provider(provider_id).await?;
        let tz = self.time_zone_of(&provider);

        let free = self.free_intervals(&provider, tz, date, location_id, now).await?;
        let slots: Vec<Slot> = candidate_slots(&free, duration, self.step, now)
            .into_iter()
            .map(|(start, end)| Slot::new(start, end, tz))
            .collect();

        debug!(
            provider_id = %provider_id,
            "{} slot(s) of {} min on {}",
            slots.len(),
            duration_minutes,
            date
        );
        Ok(slots)
    }

    pub async fn is_available(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i64,
        location_id: Option<Uuid>,
    ) -> Result<bool, AvailabilityError> {
        self.is_available_at(
            provider_id,
            date,
            start_time,
            duration_minutes,
            location_id,
            Utc::now(),
        )
        .await
    }

    /// True iff `[start, start + duration)` lies inside one free interval and is not past.
    pub async fn is_available_at(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i64,
        location_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<bool, AvailabilityError> {
        let duration = checked_duration(duration_minutes)?;
        let provider = self.provider(provider_id).await?;
        let tz = self.time_zone_of(&provider);

        let start = local_to_utc(tz, date.and_time(start_time));
        if start < now {
            return Ok(false);
        }
        let free = self.free_intervals(&provider, tz, date, location_id, now).await?;
        Ok(fits(&free, start, start + duration))
    }

    /// Open time of the provider on `date` minus everything that blocks it.
    async fn free_intervals(
        &self,
        provider: &Provider,
        tz: Tz,
        date: NaiveDate,
        location_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Interval>, AvailabilityError> {
        let today = now.with_timezone(&tz).date_naive();
        let last_day = today + Duration::days(provider.advance_booking_days.max(0));
        if date < today || date > last_day {
            debug!(provider_id = %provider.id, "{} is outside the booking horizon", date);
            return Ok(Vec::new());
        }

        let Some(template) = self
            .templates
            .get_effective_template_for_date(provider.id, date)
            .await?
        else {
            debug!(provider_id = %provider.id, "No template for {}, closed", date);
            return Ok(Vec::new());
        };

        let mut open: Vec<Interval> = get_effective_availability_for_date(&template, date)
            .iter()
            .filter_map(|slot| slot.bounds())
            .map(|(start, end)| to_utc(tz, date, start, end))
            .collect();

        if let Some(location_id) = location_id {
            let windows: Vec<Interval> = self
                .templates
                .location_windows_for_date(provider.id, location_id, date)
                .await?
                .into_iter()
                .map(|(start, end)| to_utc(tz, date, start, end))
                .collect();
            open = intersect(&open, &windows);
        }
        if open.is_empty() {
            return Ok(open);
        }

        let busy = self.busy_intervals(provider, tz, date).await?;
        Ok(subtract_busy(&open, &busy))
    }

    async fn busy_intervals(
        &self,
        provider: &Provider,
        tz: Tz,
        date: NaiveDate,
    ) -> Result<Vec<Interval>, AvailabilityError> {
        let (day_start, day_end) = local_day_bounds(tz, date);
        let buffer = Duration::minutes(provider.buffer_minutes.max(0));

        // inactive connections still count: a stale cache beats ignoring known events
        let booking_calendars: HashSet<(Uuid, String)> = self
            .repos
            .connections
            .find_for_provider(provider.id, false)
            .await?
            .iter()
            .flat_map(|c| {
                c.booking_calendar_ids()
                    .map(move |calendar_id| (c.id, calendar_id.to_string()))
            })
            .collect();

        let events = self
            .repos
            .events
            .find_for_provider_in_range(provider.id, day_start, day_end)
            .await?;
        let booked = self.repos.bookings.active_counts_by_event(provider.id).await?;

        let mut busy: Vec<Interval> = events
            .iter()
            .filter(|e| {
                booking_calendars.contains(&(e.connection_id, e.remote_calendar_id.clone()))
            })
            .filter(|e| {
                // appointment events stay open until their capacity is used up
                !e.allow_bookings || booked.get(&e.id).copied().unwrap_or(0) >= e.max_bookings
            })
            .map(|e| (e.start_time, e.end_time))
            .collect();

        let bookings = self
            .repos
            .bookings
            .find_active_in_range(provider.id, day_start - buffer, day_end + buffer)
            .await?;
        busy.extend(
            bookings
                .iter()
                .filter(|b| b.calendar_event_id.is_none())
                .map(|b| (b.start_time - buffer, b.end_time() + buffer)),
        );

        if busy.len() > 200 {
            warn!(provider_id = %provider.id, "{} busy blocks on {}", busy.len(), date);
        }
        Ok(busy)
    }
}

fn checked_duration(minutes: i64) -> Result<Duration, AvailabilityError> {
    if minutes <= 0 || minutes > MAX_DURATION_MINUTES {
        return Err(AvailabilityError::InvalidInput(format!(
            "duration must be between 1 and {} minutes, got {}",
            MAX_DURATION_MINUTES, minutes
        )));
    }
    Ok(Duration::minutes(minutes))
}

fn to_utc(tz: Tz, date: NaiveDate, start: u32, end: u32) -> Interval {
    (
        local_minute_to_utc(tz, date, start),
        local_minute_to_utc(tz, date, end),
    )
}
