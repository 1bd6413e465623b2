// --- File: crates/bookify_sync/src/orchestrator.rs ---

//! Pulls remote events into the local cache.
//!
//! A connection is synced by at most one task at a time. Each sync-enabled calendar is
//! fetched and reconciled on its own, so one failing calendar never hides the others.
//! Remote failures become report entries; only database trouble is returned as an error.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use bookify_calendar::{
    AdapterError, AdapterRegistry, CalendarAdapter, Credential, DateRange, NormalizedEvent,
};
use bookify_common::models::{local_day_bounds, CalendarConnection, Platform};
use bookify_config::{AppConfig, SyncConfig};
use bookify_db::repositories::{
    CalendarEventRepository, ConnectionRepository, EventUpsert, ProviderRepository, PruneScope,
    Repositories,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::tokens::TokenLifecycleManager;

const MAX_FAN_OUT: usize = 8;

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Syncing,
    /// Inactive until the provider reconnects.
    Degraded,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed,
    /// Some calendars synced, some failed.
    Partial,
    Failed,
    /// Credentials are gone; nothing is fetched until reconnect.
    Degraded,
    AlreadyInProgress,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CalendarSyncResult {
    pub calendar_id: String,
    pub fetched: usize,
    /// Cache rows inserted or changed.
    pub written: u64,
    pub removed: u64,
    pub error: Option<String>,
}

impl CalendarSyncResult {
    fn failed(calendar_id: &str, error: impl ToString) -> Self {
        Self {
            calendar_id: calendar_id.to_string(),
            fetched: 0,
            written: 0,
            removed: 0,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionSyncReport {
    pub connection_id: Uuid,
    pub platform: Option<Platform>,
    pub outcome: SyncOutcome,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub calendars: Vec<CalendarSyncResult>,
    /// Connection-level failure, if any.
    pub error: Option<String>,
}

impl ConnectionSyncReport {
    fn without_fetch(
        connection_id: Uuid,
        platform: Option<Platform>,
        outcome: SyncOutcome,
        window: DateRange,
        error: Option<String>,
    ) -> Self {
        Self {
            connection_id,
            platform,
            outcome,
            window_start: window.start,
            window_end: window.end,
            calendars: Vec::new(),
            error,
        }
    }

    /// Completed, or skipped because another task is already on it.
    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            SyncOutcome::Completed | SyncOutcome::AlreadyInProgress
        )
    }
}

/// Result of a provider-wide sync.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyncReport {
    pub provider_id: Uuid,
    pub connections: Vec<ConnectionSyncReport>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.connections.iter().all(ConnectionSyncReport::is_success)
    }
}

/// Removes the connection from the in-flight set when dropped.
struct InFlightGuard {
    in_flight: Arc<DashMap<Uuid, ()>>,
    connection_id: Uuid,
}

impl InFlightGuard {
    fn acquire(in_flight: &Arc<DashMap<Uuid, ()>>, connection_id: Uuid) -> Option<Self> {
        match in_flight.entry(connection_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self {
                    in_flight: Arc::clone(in_flight),
                    connection_id,
                })
            }
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.connection_id);
    }
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    repos: Repositories,
    adapters: AdapterRegistry,
    tokens: TokenLifecycleManager,
    config: SyncConfig,
    default_tz: Tz,
    in_flight: Arc<DashMap<Uuid, ()>>,
}

impl SyncOrchestrator {
    pub fn new(
        repos: Repositories,
        adapters: AdapterRegistry,
        tokens: TokenLifecycleManager,
        config: &AppConfig,
    ) -> Self {
        let default_tz = Tz::from_str(&config.scheduling.default_time_zone).unwrap_or_else(|_| {
            warn!(
                "Unknown default time zone {:?}, using UTC",
                config.scheduling.default_time_zone
            );
            Tz::UTC
        });
        Self {
            repos,
            adapters,
            tokens,
            config: config.sync.clone(),
            default_tz,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn tokens(&self) -> &TokenLifecycleManager {
        &self.tokens
    }

    fn window(&self, ahead_days: i64) -> DateRange {
        let now = Utc::now();
        DateRange::new(
            now - Duration::days(self.config.lookback_days.max(0)),
            now + Duration::days(ahead_days.max(1)),
        )
    }

    fn fan_out(&self) -> usize {
        self.config.max_concurrent_syncs.clamp(1, MAX_FAN_OUT)
    }

    /// Regular sync over `[now - lookback_days, now + fetch_window_days)`.
    pub async fn sync_connection(
        &self,
        connection_id: Uuid,
    ) -> Result<ConnectionSyncReport, SyncError> {
        let window = self.window(self.config.fetch_window_days);
        self.sync_window(connection_id, window).await
    }

    /// Slow full-range sync over `[now - lookback_days, now + backfill_days)`.
    pub async fn backfill_connection(
        &self,
        connection_id: Uuid,
    ) -> Result<ConnectionSyncReport, SyncError> {
        let window = self.window(self.config.backfill_days);
        info!(connection_id = %connection_id, "Starting backfill until {}", window.end);
        self.sync_window(connection_id, window).await
    }

    /// Every active connection of the provider, with bounded parallelism.
    pub async fn sync_all_calendars(&self, provider_id: Uuid) -> Result<SyncReport, SyncError> {
        let window = self.window(self.config.fetch_window_days);
        self.sync_provider(provider_id, window).await
    }

    pub async fn backfill_all_calendars(&self, provider_id: Uuid) -> Result<SyncReport, SyncError> {
        let window = self.window(self.config.backfill_days);
        self.sync_provider(provider_id, window).await
    }

    /// Fetches only the provider-local day of `date` before an availability lookup.
    ///
    /// Never fails: problems are logged and left in the report.
    pub async fn sync_for_booking_lookup(&self, provider_id: Uuid, date: NaiveDate) -> SyncReport {
        let tz = match self.repos.providers.find_provider(provider_id).await {
            Ok(provider) => provider.map_or(self.default_tz, |p| p.tz_or(self.default_tz)),
            Err(e) => {
                warn!(provider_id = %provider_id, "Lookup sync skipped: {}", e);
                return SyncReport {
                    provider_id,
                    connections: Vec::new(),
                };
            }
        };
        let (start, end) = local_day_bounds(tz, date);
        match self.sync_provider(provider_id, DateRange::new(start, end)).await {
            Ok(report) => report,
            Err(e) => {
                warn!(provider_id = %provider_id, "Lookup sync failed: {}", e);
                SyncReport {
                    provider_id,
                    connections: Vec::new(),
                }
            }
        }
    }

    pub async fn state(&self, connection_id: Uuid) -> Result<SyncState, SyncError> {
        if self.in_flight.contains_key(&connection_id) {
            return Ok(SyncState::Syncing);
        }
        let connection = self
            .repos
            .connections
            .find_connection(connection_id)
            .await?
            .ok_or(SyncError::ConnectionNotFound(connection_id))?;
        Ok(if connection.is_active && !connection.reauth_required {
            SyncState::Idle
        } else {
            SyncState::Degraded
        })
    }

    async fn sync_provider(
        &self,
        provider_id: Uuid,
        window: DateRange,
    ) -> Result<SyncReport, SyncError> {
        let connection_ids: Vec<Uuid> = self
            .repos
            .connections
            .find_for_provider(provider_id, true)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        debug!(
            provider_id = %provider_id,
            "Syncing {} connection(s), {} at a time",
            connection_ids.len(),
            self.fan_out()
        );

        let connections = stream::iter(connection_ids)
            .map(|connection_id| self.sync_reported(connection_id, window))
            .buffer_unordered(self.fan_out())
            .collect::<Vec<_>>()
            .await;

        Ok(SyncReport {
            provider_id,
            connections,
        })
    }

    /// Folds every error into a `Failed` record so siblings keep going.
    async fn sync_reported(&self, connection_id: Uuid, window: DateRange) -> ConnectionSyncReport {
        match self.sync_window(connection_id, window).await {
            Ok(report) => report,
            Err(e) => {
                error!(connection_id = %connection_id, "Sync failed: {}", e);
                ConnectionSyncReport::without_fetch(
                    connection_id,
                    None,
                    SyncOutcome::Failed,
                    window,
                    Some(e.to_string()),
                )
            }
        }
    }

    async fn sync_window(
        &self,
        connection_id: Uuid,
        window: DateRange,
    ) -> Result<ConnectionSyncReport, SyncError> {
        let Some(_in_flight) = InFlightGuard::acquire(&self.in_flight, connection_id) else {
            debug!(connection_id = %connection_id, "Sync already in progress");
            return Ok(ConnectionSyncReport::without_fetch(
                connection_id,
                None,
                SyncOutcome::AlreadyInProgress,
                window,
                None,
            ));
        };

        let connection = self
            .repos
            .connections
            .find_connection(connection_id)
            .await?
            .ok_or(SyncError::ConnectionNotFound(connection_id))?;
        self.sync_loaded(connection, window).await
    }

    async fn sync_loaded(
        &self,
        connection: CalendarConnection,
        window: DateRange,
    ) -> Result<ConnectionSyncReport, SyncError> {
        let degraded = |error: &str| {
            ConnectionSyncReport::without_fetch(
                connection.id,
                Some(connection.platform),
                SyncOutcome::Degraded,
                window,
                Some(error.to_string()),
            )
        };
        if !connection.is_active || connection.reauth_required {
            debug!(connection_id = %connection.id, "Connection inactive, not fetching");
            return Ok(degraded("connection requires reauthorization"));
        }

        let failed = |error: String| {
            ConnectionSyncReport::without_fetch(
                connection.id,
                Some(connection.platform),
                SyncOutcome::Failed,
                window,
                Some(error),
            )
        };
        let adapter = match self.adapters.get(connection.platform) {
            Ok(adapter) => adapter,
            Err(e) => return Ok(failed(e.to_string())),
        };
        let mut credential = match self.tokens.ensure_valid_token(connection.id).await {
            Ok(credential) => credential,
            Err(SyncError::ReauthRequired(_)) => {
                return Ok(degraded("connection requires reauthorization"))
            }
            Err(SyncError::Database(e)) => return Err(e.into()),
            Err(e) => return Ok(failed(e.to_string())),
        };

        let tz = self
            .repos
            .providers
            .find_provider(connection.provider_id)
            .await?
            .map_or(self.default_tz, |p| p.tz_or(self.default_tz));
        let synced_at = Utc::now();

        let mut calendars = Vec::new();
        let mut reauth = false;
        for settings in connection.calendars.iter().filter(|c| c.sync_enabled) {
            let calendar_id = settings.calendar_id.as_str();
            if reauth {
                calendars.push(CalendarSyncResult::failed(
                    calendar_id,
                    "connection requires reauthorization",
                ));
                continue;
            }

            let fetched = self
                .fetch_calendar(
                    adapter.as_ref(),
                    &connection,
                    &mut credential,
                    calendar_id,
                    window,
                    tz,
                )
                .await;
            let result = match fetched {
                Ok(events) => {
                    match self
                        .store(&connection, calendar_id, &events, window, synced_at)
                        .await
                    {
                        Ok(result) => result,
                        Err(e) => CalendarSyncResult::failed(calendar_id, e),
                    }
                }
                Err(e) => {
                    if matches!(e, SyncError::ReauthRequired(_)) {
                        reauth = true;
                    }
                    warn!(
                        connection_id = %connection.id,
                        calendar_id = calendar_id,
                        "Calendar sync failed: {}",
                        e
                    );
                    CalendarSyncResult::failed(calendar_id, e)
                }
            };
            calendars.push(result);
        }

        let succeeded = calendars.iter().filter(|c| c.is_ok()).count();
        if succeeded > 0 {
            self.repos
                .connections
                .mark_synced(connection.id, synced_at)
                .await?;
        }

        let outcome = if succeeded == calendars.len() {
            SyncOutcome::Completed
        } else if succeeded > 0 {
            SyncOutcome::Partial
        } else if reauth {
            SyncOutcome::Degraded
        } else {
            SyncOutcome::Failed
        };
        info!(
            connection_id = %connection.id,
            platform = %connection.platform,
            "Sync finished: {:?}, {}/{} calendar(s) ok",
            outcome,
            succeeded,
            calendars.len()
        );

        Ok(ConnectionSyncReport {
            connection_id: connection.id,
            platform: Some(connection.platform),
            outcome,
            window_start: window.start,
            window_end: window.end,
            calendars,
            error: reauth.then(|| "connection requires reauthorization".to_string()),
        })
    }

    /// One fetch; on `AuthExpired` one refresh and exactly one retry.
    async fn fetch_calendar(
        &self,
        adapter: &dyn CalendarAdapter,
        connection: &CalendarConnection,
        credential: &mut Credential,
        calendar_id: &str,
        window: DateRange,
        tz: Tz,
    ) -> Result<Vec<NormalizedEvent>, SyncError> {
        match adapter.list_events(credential, calendar_id, window, tz).await {
            Ok(events) => return Ok(events),
            Err(AdapterError::AuthExpired(reason)) => {
                debug!(
                    connection_id = %connection.id,
                    "Token rejected ({}), refreshing once",
                    reason
                );
            }
            Err(e) => return Err(e.into()),
        }

        *credential = self
            .tokens
            .refresh_after_rejection(connection.id, &credential.access_token)
            .await?;

        match adapter.list_events(credential, calendar_id, window, tz).await {
            Ok(events) => Ok(events),
            Err(AdapterError::AuthExpired(reason)) => {
                self.tokens
                    .mark_reauth_required(connection.id, &reason)
                    .await?;
                Err(SyncError::ReauthRequired(connection.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Upserts the fetched events and prunes what disappeared from this calendar's window.
    async fn store(
        &self,
        connection: &CalendarConnection,
        calendar_id: &str,
        events: &[NormalizedEvent],
        window: DateRange,
        synced_at: DateTime<Utc>,
    ) -> Result<CalendarSyncResult, SyncError> {
        let upserts: Vec<EventUpsert> = events.iter().map(to_upsert).collect();
        let written = self
            .repos
            .events
            .upsert_events(
                connection.provider_id,
                connection.id,
                calendar_id,
                &upserts,
                synced_at,
            )
            .await?;

        let keep: HashSet<String> = upserts.into_iter().map(|e| e.remote_event_id).collect();
        let removed = self
            .repos
            .events
            .prune_missing(
                PruneScope {
                    connection_id: connection.id,
                    remote_calendar_id: calendar_id,
                    window_start: window.start,
                    window_end: window.end,
                },
                &keep,
            )
            .await?;

        Ok(CalendarSyncResult {
            calendar_id: calendar_id.to_string(),
            fetched: events.len(),
            written,
            removed,
            error: None,
        })
    }
}

fn to_upsert(event: &NormalizedEvent) -> EventUpsert {
    EventUpsert {
        remote_event_id: event.remote_event_id.clone(),
        title: event.title.clone(),
        location: event.location.clone(),
        start_time: event.start_time,
        end_time: event.end_time,
        is_all_day: event.is_all_day,
    }
}
