// --- File: crates/bookify_common/src/models.rs ---

//! Domain models shared by the sync, availability and booking crates.
//!
//! These are plain serde structs. Persistence wrappers live in `bookify-db`.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parses a wall-clock time in `HH:MM` form.
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// Last minute of the day, the only value `"24:00"` parses to.
pub const END_OF_DAY_MINUTE: u32 = 24 * 60;

/// Minutes since local midnight for an `HH:MM` value. `"24:00"` is accepted as the end of
/// the day, so a window can close at midnight.
pub fn parse_minute_of_day(value: &str) -> Option<u32> {
    if value.trim() == "24:00" {
        return Some(END_OF_DAY_MINUTE);
    }
    parse_hhmm(value).map(|t| t.hour() * 60 + t.minute())
}

/// UTC instant of `minute` minutes after local midnight of `date`. Minute 1440 is the next
/// day's midnight.
pub fn local_minute_to_utc(tz: Tz, date: NaiveDate, minute: u32) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(minute));
    local_to_utc(tz, local)
}

/// Weekday index with Sunday = 0, used by templates and location schedules.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Converts a provider-local wall-clock time to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a DST gap resolve to
/// the first valid instant after the gap.
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    let mut candidate = local;
    // gaps are at most a few hours; step minute by minute until the wall clock exists
    for _ in 0..=(4 * 60) {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                return dt.with_timezone(&Utc)
            }
            LocalResult::None => candidate += Duration::minutes(1),
        }
    }
    Utc.from_utc_datetime(&local)
}

/// UTC bounds of the provider-local day `[00:00, next day 00:00)`.
pub fn local_day_bounds(tz: Tz, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_to_utc(tz, date.and_time(NaiveTime::MIN));
    let next = date.succ_opt().unwrap_or(date);
    let end = local_to_utc(tz, next.and_time(NaiveTime::MIN));
    (start, end)
}

// --- Provider ---

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    /// IANA zone, e.g. "Europe/Zurich"
    pub time_zone: String,
    pub default_duration_minutes: i64,
    pub buffer_minutes: i64,
    /// How many days ahead customers may book.
    pub advance_booking_days: i64,
    /// Durations offered to the public booking flow. Empty means any duration.
    pub allowed_durations: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

impl Provider {
    pub fn new(name: impl Into<String>, time_zone: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            time_zone: time_zone.into(),
            default_duration_minutes: 60,
            buffer_minutes: 0,
            advance_booking_days: 90,
            allowed_durations: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// The provider's zone, or `fallback` when the stored name is not a known IANA zone.
    pub fn tz_or(&self, fallback: Tz) -> Tz {
        Tz::from_str(&self.time_zone).unwrap_or(fallback)
    }

    pub fn allows_duration(&self, minutes: i64) -> bool {
        self.allowed_durations.is_empty() || self.allowed_durations.contains(&minutes)
    }
}

// --- Calendar connections ---

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    Google,
    Outlook,
    Teams,
    Apple,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Google => "GOOGLE",
            Platform::Outlook => "OUTLOOK",
            Platform::Teams => "TEAMS",
            Platform::Apple => "APPLE",
        }
    }

    /// Apple uses an app-specific password instead of OAuth tokens.
    pub fn uses_oauth(&self) -> bool {
        !matches!(self, Platform::Apple)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GOOGLE" => Ok(Platform::Google),
            "OUTLOOK" => Ok(Platform::Outlook),
            "TEAMS" => Ok(Platform::Teams),
            "APPLE" => Ok(Platform::Apple),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Per remote calendar switches of a connection.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarSettings {
    pub calendar_id: String,
    #[serde(default = "default_true")]
    pub sync_enabled: bool,
    /// Events of this calendar take part in availability and booking checks.
    #[serde(default = "default_true")]
    pub booking_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl CalendarSettings {
    pub fn new(calendar_id: impl Into<String>) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            sync_enabled: true,
            booking_enabled: true,
        }
    }
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarConnection {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub platform: Platform,
    pub account_email: Option<String>,
    /// OAuth access token, or the app-specific password for Apple.
    #[serde(skip_serializing, default)]
    pub access_token: String,
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub calendars: Vec<CalendarSettings>,
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

impl CalendarConnection {
    pub fn new(provider_id: Uuid, platform: Platform, access_token: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            provider_id,
            platform,
            account_email: None,
            access_token: access_token.into(),
            refresh_token: None,
            token_expires_at: None,
            calendars: Vec::new(),
            is_active: true,
            reauth_required: false,
            is_default_for_bookings: false,
            last_sync_at: None,
            sync_frequency_minutes: 15,
            webhook_subscription_id: None,
            webhook_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the token expires at or before `now + horizon`.
    pub fn token_expires_within(&self, now: DateTime<Utc>, horizon: Duration) -> bool {
        match self.token_expires_at {
            Some(expires_at) => expires_at <= now + horizon,
            None => false,
        }
    }

    pub fn booking_calendar_ids(&self) -> impl Iterator<Item = &str> {
        self.calendars
            .iter()
            .filter(|c| c.booking_enabled)
            .map(|c| c.calendar_id.as_str())
    }
}

// --- Cached remote events ---

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
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
    /// Appointment-type event customers can book into. `false` means a plain busy block.
    pub allow_bookings: bool,
    pub max_bookings: i64,
    pub synced_at: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

// --- Availability templates ---

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u8,
    /// "HH:MM" provider-local
    pub start_time: String,
    /// "HH:MM" provider-local, after `start_time` on the same day
    pub end_time: String,
    pub enabled: bool,
}

impl TimeSlot {
    pub fn new(day_of_week: u8, start_time: &str, end_time: &str) -> Self {
        Self {
            day_of_week,
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
            enabled: true,
        }
    }

    /// Start and end as minutes of the day, `None` when malformed or not strictly increasing.
    pub fn bounds(&self) -> Option<(u32, u32)> {
        minute_bounds(&self.start_time, &self.end_time)
    }

    pub fn is_valid(&self) -> bool {
        self.day_of_week <= 6 && self.bounds().is_some()
    }
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityTemplate {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub is_default: bool,
    pub slots: Vec<TimeSlot>,
    pub created_at: DateTime<Utc>,
}

impl AvailabilityTemplate {
    pub fn new(provider_id: Uuid, name: impl Into<String>, slots: Vec<TimeSlot>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_id,
            name: name.into(),
            is_default: false,
            slots,
            created_at: Utc::now(),
        }
    }
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateAssignment {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub template_id: Uuid,
    pub start_date: NaiveDate,
    /// `None` means open-ended.
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl TemplateAssignment {
    pub fn new(
        provider_id: Uuid,
        template_id: Uuid,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_id,
            template_id,
            start_date,
            end_date,
            created_at: Utc::now(),
        }
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start_date && self.end_date.map_or(true, |end| date <= end)
    }
}

// --- Customers and bookings ---

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Rescheduled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Rescheduled => "RESCHEDULED",
        }
    }

    /// Active bookings occupy time and count against event capacity.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "RESCHEDULED" => Ok(BookingStatus::Rescheduled),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub customer_id: Uuid,
    pub calendar_event_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: BookingStatus,
    pub service_type: Option<String>,
    pub notes: Option<String>,
    pub rescheduled_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes)
    }
}

// --- Locations ---

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderLocation {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub address: Option<String>,
}

/// A location opening window, either weekly (`day_of_week`) or one-off (`specific_date`).
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationSchedule {
    pub id: Uuid,
    pub location_id: Uuid,
    pub day_of_week: Option<u8>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: String,
    pub end_time: String,
    pub enabled: bool,
}

impl LocationSchedule {
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        if !self.enabled {
            return false;
        }
        match (self.specific_date, self.day_of_week) {
            (Some(specific), _) => specific == date,
            (None, Some(dow)) => dow == day_of_week(date),
            (None, None) => false,
        }
    }

    pub fn bounds(&self) -> Option<(u32, u32)> {
        minute_bounds(&self.start_time, &self.end_time)
    }
}

fn minute_bounds(start: &str, end: &str) -> Option<(u32, u32)> {
    let start = parse_minute_of_day(start)?;
    let end = parse_minute_of_day(end)?;
    (end > start).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sunday_is_day_zero() {
        // 2024-01-21 is a Sunday, 2024-01-22 a Monday
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2024, 1, 21).unwrap()), 0);
        assert_eq!(day_of_week(NaiveDate::from_ymd_opt(2024, 1, 22).unwrap()), 1);
    }

    #[test]
    fn dst_gap_resolves_to_first_valid_instant() {
        let tz: Tz = "Europe/Zurich".parse().unwrap();
        // 2024-03-31 02:30 does not exist in Zurich, clocks jump from 02:00 to 03:00
        let gap = NaiveDate::from_ymd_opt(2024, 3, 31)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        assert_eq!(
            local_to_utc(tz, gap),
            Utc.with_ymd_and_hms(2024, 3, 31, 1, 0, 0).unwrap()
        );
    }

    #[test]
    fn local_day_is_shorter_on_spring_forward() {
        let tz: Tz = "Europe/Zurich".parse().unwrap();
        let (start, end) = local_day_bounds(tz, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert_eq!((end - start).num_hours(), 23);
    }

    #[test]
    fn cross_midnight_slots_are_invalid() {
        assert!(TimeSlot::new(1, "08:00", "18:00").is_valid());
        assert!(!TimeSlot::new(1, "22:00", "02:00").is_valid());
        assert!(!TimeSlot::new(7, "08:00", "09:00").is_valid());
        assert!(!TimeSlot::new(1, "8am", "09:00").is_valid());
    }

    #[test]
    fn windows_may_close_at_midnight() {
        assert_eq!(TimeSlot::new(5, "18:00", "24:00").bounds(), Some((18 * 60, 24 * 60)));
        assert!(!TimeSlot::new(5, "24:00", "24:00").is_valid());
        assert!(!TimeSlot::new(5, "18:00", "24:30").is_valid());
        // "24:00" only ends a window, it is not a clock time
        assert_eq!(parse_hhmm("24:00"), None);
    }

    #[test]
    fn end_of_day_is_next_local_midnight() {
        let tz: Tz = "Europe/Zurich".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 22).unwrap();
        assert_eq!(
            local_minute_to_utc(tz, date, END_OF_DAY_MINUTE),
            Utc.with_ymd_and_hms(2024, 1, 22, 23, 0, 0).unwrap()
        );
        assert_eq!(
            local_minute_to_utc(tz, date, 8 * 60 + 30),
            Utc.with_ymd_and_hms(2024, 1, 22, 7, 30, 0).unwrap()
        );
    }

    #[test]
    fn open_ended_assignment_covers_future() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let assignment = TemplateAssignment::new(Uuid::new_v4(), Uuid::new_v4(), start, None);
        assert!(assignment.covers(NaiveDate::from_ymd_opt(2030, 6, 1).unwrap()));
        assert!(!assignment.covers(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()));
    }

    #[test]
    fn token_horizon() {
        let now = Utc::now();
        let mut connection = CalendarConnection::new(Uuid::new_v4(), Platform::Google, "t");
        assert!(!connection.token_expires_within(now, Duration::minutes(5)));
        connection.token_expires_at = Some(now + Duration::minutes(4));
        assert!(connection.token_expires_within(now, Duration::minutes(5)));
        connection.token_expires_at = Some(now + Duration::minutes(30));
        assert!(!connection.token_expires_within(now, Duration::minutes(5)));
    }

    #[test]
    fn platform_round_trips_through_str() {
        for platform in [
            Platform::Google,
            Platform::Outlook,
            Platform::Teams,
            Platform::Apple,
        ] {
            assert_eq!(platform.as_str().parse::<Platform>(), Ok(platform));
        }
    }
}
