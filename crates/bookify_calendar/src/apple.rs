//! Apple iCloud adapter over CalDAV.
//!
//! Authenticates with the Apple ID and an app-specific password (HTTP Basic). Events are
//! fetched with a `calendar-query` REPORT filtered by time range; the server expands
//! recurring events into instances. There is no push channel, connections are polled.

use crate::adapter::{
    all_day_interval, CalendarAdapter, ConnectRequest, Credential, DateRange, NormalizedEvent,
    TokenGrant,
};
use crate::error::AdapterError;
use async_trait::async_trait;
use bookify_common::models::{local_to_utc, Platform};
use bookify_config::AppleConfig;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use icalendar::parser::{read_calendar, unfold, Component};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, warn};

const CALDAV_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Apple CalDAV adapter
#[derive(Debug, Clone)]
pub struct AppleCalendarAdapter {
    client: Client,
    base_url: String,
}

/// A fetched calendar resource with its ICS data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarResource {
    pub href: String,
    pub etag: Option<String>,
    pub data: String,
}

impl AppleCalendarAdapter {
    pub fn new(client: Client, config: &AppleConfig) -> Self {
        Self {
            client,
            base_url: config.caldav_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Calendar ids are collection hrefs (`/123/calendars/home/`) or full URLs.
    fn collection_url(&self, calendar_id: &str) -> String {
        if calendar_id.starts_with("http://") || calendar_id.starts_with("https://") {
            calendar_id.to_string()
        } else {
            format!("{}/{}", self.base_url, calendar_id.trim_start_matches('/'))
        }
    }

    fn credentials<'a>(
        &self,
        credential: &'a Credential,
    ) -> Result<(&'a str, &'a str), AdapterError> {
        let username = credential.account_email.as_deref().ok_or_else(|| {
            AdapterError::AuthExpired("CalDAV connection has no Apple ID".to_string())
        })?;
        Ok((username, credential.access_token.as_str()))
    }

    async fn report(
        &self,
        url: &str,
        username: &str,
        password: &str,
        range: DateRange,
    ) -> Result<String, AdapterError> {
        let start = range.start.format(CALDAV_TIME_FORMAT).to_string();
        let end = range.end.format(CALDAV_TIME_FORMAT).to_string();
        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<C:calendar-query xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <prop>
        <getetag/>
        <C:calendar-data>
            <C:expand start="{start}" end="{end}"/>
        </C:calendar-data>
    </prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">
                <C:time-range start="{start}" end="{end}"/>
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#
        );

        let method = Method::from_bytes(b"REPORT")
            .map_err(|e| AdapterError::Unsupported(e.to_string()))?;
        let response = self
            .client
            .request(method, url)
            .basic_auth(username, Some(password))
            .header("Depth", "1")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AdapterError::from_status(status, &text));
        }
        Ok(text)
    }
}

#[async_trait]
impl CalendarAdapter for AppleCalendarAdapter {
    fn platform(&self) -> Platform {
        Platform::Apple
    }

    async fn connect(&self, request: ConnectRequest) -> Result<TokenGrant, AdapterError> {
        let ConnectRequest::AppPassword { username, password } = request else {
            return Err(AdapterError::Unsupported(
                "Apple connections need an Apple ID and app-specific password".to_string(),
            ));
        };

        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| AdapterError::Unsupported(e.to_string()))?;
        let response = self
            .client
            .request(method, format!("{}/", self.base_url))
            .basic_auth(&username, Some(&password))
            .header("Depth", "0")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(
                r#"<?xml version="1.0" encoding="utf-8"?>
<propfind xmlns="DAV:"><prop><current-user-principal/></prop></propfind>"#,
            )
            .send()
            .await?;

        let status = response.status();
        if !(status.is_success() || status == StatusCode::MULTI_STATUS) {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status(status, &body));
        }

        Ok(TokenGrant {
            access_token: password,
            refresh_token: None,
            expires_at: None,
            account_email: Some(username),
        })
    }

    async fn list_events(
        &self,
        credential: &Credential,
        calendar_id: &str,
        range: DateRange,
        provider_tz: Tz,
    ) -> Result<Vec<NormalizedEvent>, AdapterError> {
        let (username, password) = self.credentials(credential)?;
        let url = self.collection_url(calendar_id);
        let body = self.report(&url, username, password, range).await?;

        let resources = parse_calendar_resources(&body)?;
        let events: Vec<NormalizedEvent> = resources
            .iter()
            .flat_map(|resource| parse_events(&resource.data, provider_tz))
            // servers may return an expanded instance that only touches the range boundary
            .filter(|event| range.overlaps(event.start_time, event.end_time))
            .collect();

        debug!(
            "Fetched {} CalDAV events from {} resources in {}",
            events.len(),
            resources.len(),
            calendar_id
        );
        Ok(events)
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant, AdapterError> {
        Err(AdapterError::Unsupported(
            "app-specific passwords cannot be refreshed".to_string(),
        ))
    }

    async fn disconnect(&self, _credential: &Credential) -> Result<(), AdapterError> {
        // app-specific passwords are revoked by the user at appleid.apple.com
        Ok(())
    }
}

/// Parse calendar resources from a CalDAV multistatus response.
pub fn parse_calendar_resources(body: &str) -> Result<Vec<CalendarResource>, AdapterError> {
    let doc = roxmltree::Document::parse(body)
        .map_err(|e| AdapterError::InvalidResponse(format!("CalDAV multistatus: {}", e)))?;
    let root = doc.root_element();
    if root.tag_name().name() != "multistatus" {
        return Err(AdapterError::InvalidResponse(format!(
            "expected multistatus, got {}",
            root.tag_name().name()
        )));
    }

    let child_text = |node: roxmltree::Node<'_, '_>, name: &str| {
        node.descendants()
            .find(|n| n.tag_name().name() == name)
            .and_then(|n| n.text())
            .map(str::to_string)
    };

    let resources = root
        .children()
        .filter(|n| n.tag_name().name() == "response")
        .filter_map(|response| {
            let href = child_text(response, "href")?;
            let data = child_text(response, "calendar-data")?;
            Some(CalendarResource {
                href,
                etag: child_text(response, "getetag"),
                data,
            })
        })
        .collect();
    Ok(resources)
}

/// Every busy VEVENT of one iCalendar object.
pub fn parse_events(ics: &str, tz: Tz) -> Vec<NormalizedEvent> {
    let unfolded = unfold(ics);
    let calendar = match read_calendar(&unfolded) {
        Ok(calendar) => calendar,
        Err(e) => {
            warn!("Skipping unparseable calendar object: {}", e);
            return Vec::new();
        }
    };

    calendar
        .components
        .iter()
        .flat_map(|component| {
            // some servers keep the VCALENDAR wrapper as the top component
            if component.name == "VCALENDAR" {
                component.components.iter().collect::<Vec<_>>()
            } else {
                vec![component]
            }
        })
        .filter(|component| component.name == "VEVENT")
        .filter_map(|vevent| normalize_vevent(vevent, tz))
        .collect()
}

fn normalize_vevent(vevent: &Component<'_>, tz: Tz) -> Option<NormalizedEvent> {
    let prop = |name: &str| vevent.find_prop(name).map(|p| p.val.to_string());

    if prop("STATUS").as_deref() == Some("CANCELLED") {
        return None;
    }
    if prop("TRANSP").as_deref() == Some("TRANSPARENT") {
        return None;
    }

    let uid = prop("UID")?;
    let start = DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?;
    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok());

    let (start_time, end_time, is_all_day) = match (start, end) {
        (DatePerhapsTime::Date(start_date), end) => {
            let end_date = match end {
                Some(DatePerhapsTime::Date(d)) => Some(d),
                _ => None,
            };
            let (s, e) = all_day_interval(start_date, end_date, tz);
            (s, e, true)
        }
        (DatePerhapsTime::DateTime(start_dt), Some(DatePerhapsTime::DateTime(end_dt))) => {
            (resolve(start_dt, tz), resolve(end_dt, tz), false)
        }
        // no DTEND on a timed event: it occupies no time
        _ => return None,
    };

    if end_time <= start_time {
        return None;
    }

    // expanded recurrences share the UID; RECURRENCE-ID tells the instances apart
    let remote_event_id = match prop("RECURRENCE-ID") {
        Some(recurrence_id) => format!("{}/{}", uid, recurrence_id),
        None => uid,
    };

    Some(NormalizedEvent {
        remote_event_id,
        title: prop("SUMMARY").filter(|s| !s.trim().is_empty()),
        location: prop("LOCATION").filter(|s| !s.trim().is_empty()),
        start_time,
        end_time,
        is_all_day,
    })
}

/// Floating times and unknown TZIDs are read in the provider's zone.
fn resolve(value: CalendarDateTime, provider_tz: Tz) -> DateTime<Utc> {
    match value {
        CalendarDateTime::Utc(dt) => dt,
        CalendarDateTime::Floating(naive) => local_to_utc(provider_tz, naive),
        CalendarDateTime::WithTimezone { date_time, tzid } => {
            let zone = tzid.parse::<Tz>().unwrap_or_else(|_| {
                warn!("Unknown TZID {:?}, using provider time zone", tzid);
                provider_tz
            });
            local_to_utc(zone, date_time)
        }
    }
}
