//! Microsoft Graph adapter, shared by Outlook and Teams connections

use crate::adapter::{
    all_day_interval, expiry_from_seconds, CalendarAdapter, ConnectRequest, Credential, DateRange,
    NormalizedEvent, TokenGrant,
};
use crate::error::AdapterError;
use async_trait::async_trait;
use bookify_common::models::Platform;
use bookify_config::OAuthClientConfig;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

const MICROSOFT_GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const OUTLOOK_TIMEZONE_HEADER: &str = r#"outlook.timezone="UTC""#;
const OUTLOOK_MAX_PAGE_SIZE_HEADER: &str = r#"odata.maxpagesize=50"#;
const EVENT_FIELDS: &str = "id,subject,location,start,end,isAllDay,isCancelled,showAs";

/// Microsoft Graph calendar adapter
#[derive(Debug, Clone)]
pub struct MicrosoftCalendarAdapter {
    platform: Platform,
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: Option<String>,
    scope: String,
    api_base: String,
    token_url: String,
}

impl MicrosoftCalendarAdapter {
    /// `platform` is `Outlook` or `Teams`; both read the same Graph calendars.
    pub fn new(platform: Platform, client: Client, config: &OAuthClientConfig) -> Self {
        Self {
            platform,
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scope: config.scopes.join(" "),
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| MICROSOFT_GRAPH_API_BASE.to_string()),
            token_url: config
                .token_url
                .clone()
                .unwrap_or_else(|| MICROSOFT_TOKEN_URL.to_string()),
        }
    }

    fn calendar_view_url(&self, calendar_id: &str, range: DateRange) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| AdapterError::Unsupported(format!("invalid Graph API base: {}", e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| {
                    AdapterError::Unsupported("Graph API base cannot be a base".to_string())
                })?;
            segments.pop_if_empty();
            if calendar_id.eq_ignore_ascii_case("primary") {
                segments.extend(["me", "calendarView"]);
            } else {
                segments.extend(["me", "calendars", calendar_id, "calendarView"]);
            }
        }
        url.query_pairs_mut()
            .append_pair(
                "startDateTime",
                &range.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .append_pair("endDateTime", &range.end.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("$select", EVENT_FIELDS);
        Ok(url)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, AdapterError> {
        let response = self.client.post(&self.token_url).form(form).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(status, &body));
        }

        let token: MicrosoftTokenResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(format!("Microsoft token: {}", e)))?;
        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: expiry_from_seconds(token.expires_in),
            account_email: None,
        })
    }
}

#[async_trait]
impl CalendarAdapter for MicrosoftCalendarAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn connect(&self, request: ConnectRequest) -> Result<TokenGrant, AdapterError> {
        let ConnectRequest::AuthorizationCode { code, redirect_uri } = request else {
            return Err(AdapterError::Unsupported(
                "Microsoft connections need an authorization code".to_string(),
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
            ("scope", self.scope.as_str()),
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
        let mut next = Some(self.calendar_view_url(calendar_id, range)?.to_string());
        let mut events = Vec::new();

        // @odata.nextLink is a complete URL that already carries every query parameter
        while let Some(url) = next.take() {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&credential.access_token)
                .header("Prefer", OUTLOOK_TIMEZONE_HEADER)
                .header("Prefer", OUTLOOK_MAX_PAGE_SIZE_HEADER)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(AdapterError::from_status(status, &body));
            }

            let page: MicrosoftEventsResponse = response
                .json()
                .await
                .map_err(|e| AdapterError::InvalidResponse(format!("Graph calendarView: {}", e)))?;
            events.extend(page.value.into_iter().filter_map(|e| e.normalize(provider_tz)));
            next = page.next_link;
        }

        debug!(
            "Fetched {} {} events for calendar {}",
            events.len(),
            self.platform,
            calendar_id
        );
        Ok(events)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AdapterError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ])
        .await
    }

    async fn disconnect(&self, _credential: &Credential) -> Result<(), AdapterError> {
        // Graph offers no per-token revocation for delegated grants
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct MicrosoftEventsResponse {
    #[serde(default)]
    value: Vec<MicrosoftCalendarEvent>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MicrosoftCalendarEvent {
    id: String,
    subject: Option<String>,
    location: Option<MicrosoftLocation>,
    start: GraphDateTime,
    end: GraphDateTime,
    #[serde(default)]
    is_all_day: bool,
    #[serde(default)]
    is_cancelled: bool,
    show_as: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MicrosoftLocation {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: String,
}

#[derive(Debug, Deserialize)]
struct MicrosoftTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl MicrosoftCalendarEvent {
    fn normalize(self, tz: Tz) -> Option<NormalizedEvent> {
        if self.is_cancelled || self.show_as.as_deref() == Some("free") {
            return None;
        }

        let start = parse_graph_time(&self.start.date_time)?;
        let end = parse_graph_time(&self.end.date_time)?;
        let (start_time, end_time) = if self.is_all_day {
            // all-day events are date-only: keep the dates, place them in the provider's zone
            all_day_interval(start.date_naive(), Some(end.date_naive()), tz)
        } else {
            (start, end)
        };

        if end_time <= start_time {
            warn!("Skipping Graph event {} with empty interval", self.id);
            return None;
        }

        Some(NormalizedEvent {
            remote_event_id: self.id,
            title: self.subject.filter(|s| !s.trim().is_empty()),
            location: self
                .location
                .and_then(|l| l.display_name)
                .filter(|name| !name.is_empty()),
            start_time,
            end_time,
            is_all_day: self.is_all_day,
        })
    }
}

/// Graph answers `2024-01-22T10:00:00.0000000` in the zone asked for with `Prefer`, here UTC.
fn parse_graph_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| warn!("Unparseable Graph dateTime {:?}: {}", value, e))
        .ok()
}
