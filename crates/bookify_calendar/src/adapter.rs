//! The platform-neutral adapter interface.

use crate::error::AdapterError;
use async_trait::async_trait;
use bookify_common::models::{local_to_utc, Platform};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A remote event reduced to what availability needs. All instants are UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub remote_event_id: String,
    pub title: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
}

/// What an adapter needs to authenticate a call.
#[derive(Debug, Clone)]
pub struct Credential {
    /// OAuth access token, or the app-specific password for CalDAV.
    pub access_token: String,
    /// CalDAV user name; unused by OAuth platforms.
    pub account_email: Option<String>,
}

impl Credential {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            account_email: None,
        }
    }
}

/// Half-open UTC interval `[start, end)` to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectRequest {
    /// OAuth authorization code from the consent callback.
    AuthorizationCode {
        code: String,
        redirect_uri: Option<String>,
    },
    /// Apple ID and app-specific password.
    AppPassword { username: String, password: String },
}

/// Tokens returned by a code exchange, refresh, or password validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present when the platform issued (or rotated) a refresh token.
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub account_email: Option<String>,
}

/// One calendar platform.
///
/// Implementations only talk HTTP; persisting what they return is the caller's job.
#[async_trait]
pub trait CalendarAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn connect(&self, request: ConnectRequest) -> Result<TokenGrant, AdapterError>;

    /// Every busy event of `calendar_id` overlapping `range`, across all pages.
    /// `provider_tz` places all-day and floating events.
    async fn list_events(
        &self,
        credential: &Credential,
        calendar_id: &str,
        range: DateRange,
        provider_tz: Tz,
    ) -> Result<Vec<NormalizedEvent>, AdapterError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AdapterError>;

    /// Best-effort revocation.
    async fn disconnect(&self, credential: &Credential) -> Result<(), AdapterError>;
}

/// UTC bounds of an all-day event covering `[start_date, end_date)` in local time.
///
/// A missing or non-increasing end date means a single day.
pub fn all_day_interval(
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    tz: Tz,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let end_date = end_date
        .filter(|end| *end > start_date)
        .unwrap_or_else(|| start_date + Duration::days(1));
    (
        local_to_utc(tz, start_date.and_time(NaiveTime::MIN)),
        local_to_utc(tz, end_date.and_time(NaiveTime::MIN)),
    )
}

/// Seconds-until-expiry as reported by OAuth token endpoints.
pub(crate) fn expiry_from_seconds(expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in.map(|secs| Utc::now() + Duration::seconds(secs))
}
