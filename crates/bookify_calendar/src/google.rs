//! Google Calendar adapter (Calendar API v3)

use crate::adapter::{
    all_day_interval, expiry_from_seconds, CalendarAdapter, ConnectRequest, Credential, DateRange,
    NormalizedEvent, TokenGrant,
};
use crate::error::AdapterError;
use async_trait::async_trait;
use bookify_common::models::Platform;
use bookify_config::OAuthClientConfig;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use chrono_tz::Tz;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const PAGE_SIZE: &str = "250";

/// Google Calendar adapter
#[derive(Debug, Clone)]
pub struct GoogleCalendarAdapter {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: Option<String>,
    api_base: String,
    token_url: String,
    revoke_url: String,
}

impl GoogleCalendarAdapter {
    pub fn new(client: Client, config: &OAuthClientConfig) -> Self {
        Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| GOOGLE_CALENDAR_API_BASE.to_string()),
            token_url: config
                .token_url
                .clone()
                .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
            revoke_url: config
                .revoke_url
                .clone()
                .unwrap_or_else(|| GOOGLE_REVOKE_URL.to_string()),
        }
    }

    fn events_url(&self, calendar_id: &str) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| AdapterError::Unsupported(format!("invalid Google API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AdapterError::Unsupported("Google API base cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["calendars", calendar_id, "events"]);
        Ok(url)
    }

    async fn fetch_page(
        &self,
        url: &Url,
        access_token: &str,
        range: DateRange,
        page_token: Option<&str>,
    ) -> Result<GoogleEventsResponse, AdapterError> {
        let mut query = vec![
            ("timeMin", range.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("timeMax", range.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(status, &body));
        }

        response
            .json::<GoogleEventsResponse>()
            .await
            .map_err(|e| AdapterError::InvalidResponse(format!("Google events: {}", e)))
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, AdapterError> {
        let response = self.client.post(&self.token_url).form(form).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(status, &body));
        }

        let token: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(format!("Google token: {}", e)))?;
        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: expiry_from_seconds(token.expires_in),
            account_email: None,
        })
    }
}

#[async_trait]
impl CalendarAdapter for GoogleCalendarAdapter {
    fn platform(&self) -> Platform {
        Platform::Google
    }

    async fn connect(&self, request: ConnectRequest) -> Result<TokenGrant, AdapterError> {
        let ConnectRequest::AuthorizationCode { code, redirect_uri } = request else {
            return Err(AdapterError::Unsupported(
                "Google connections need an authorization code".to_string(),
            ));
        };
        let redirect_uri = redirect_uri
            .or_else(|| self.redirect_uri.clone())
            .unwrap_or_default();

        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ])
        .await
    }

    async fn list_events(
        &self,
        credential: &Credential,
        calendar_id: &str,
        range: DateRange,
        provider_tz: Tz,
    ) -> Result<Vec<NormalizedEvent>, AdapterError> {
        let url = self.events_url(calendar_id)?;
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            let page = self
                .fetch_page(&url, &credential.access_token, range, page_token.as_deref())
                .await?;
            pages += 1;
            events.extend(page.items.into_iter().filter_map(|item| item.normalize(provider_tz)));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(
            "Fetched {} Google events for calendar {} in {} page(s)",
            events.len(),
            calendar_id,
            pages
        );
        Ok(events)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AdapterError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ])
        .await
    }

    async fn disconnect(&self, credential: &Credential) -> Result<(), AdapterError> {
        let response = self
            .client
            .post(&self.revoke_url)
            .form(&[("token", credential.access_token.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AdapterError::from_status(status, &body))
    }
}

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarEvent>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    location: Option<String>,
    transparency: Option<String>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
}

#[derive(Debug, Deserialize)]
struct EventDateTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl GoogleCalendarEvent {
    /// `None` for events that never occupy time or cannot be read.
    fn normalize(self, tz: Tz) -> Option<NormalizedEvent> {
        if self.status.as_deref() == Some("cancelled") {
            return None;
        }
        if self.transparency.as_deref() == Some("transparent") {
            return None;
        }

        let (start, end) = (self.start?, self.end?);
        let (start_time, end_time, is_all_day) =
            match (start.date_time.as_deref(), end.date_time.as_deref()) {
                (Some(start_dt), Some(end_dt)) => {
                    (parse_instant(start_dt)?, parse_instant(end_dt)?, false)
                }
                _ => {
                    let start_date = parse_date(start.date.as_deref()?)?;
                    let end_date = end.date.as_deref().and_then(parse_date);
                    let (s, e) = all_day_interval(start_date, end_date, tz);
                    (s, e, true)
                }
            };

        if end_time <= start_time {
            warn!("Skipping Google event {} with empty interval", self.id);
            return None;
        }

        Some(NormalizedEvent {
            remote_event_id: self.id,
            title: self.summary.filter(|s| !s.trim().is_empty()),
            location: self.location,
            start_time,
            end_time,
            is_all_day,
        })
    }
}

fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| warn!("Unparseable Google dateTime {:?}: {}", value, e))
        .ok()
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}
