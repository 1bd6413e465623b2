//! Scripted adapter and database fixture shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bookify_calendar::{
    AdapterError, AdapterRegistry, CalendarAdapter, ConnectRequest, Credential, DateRange,
    NormalizedEvent, TokenGrant,
};
use bookify_common::models::{CalendarConnection, CalendarSettings, Platform, Provider};
use bookify_config::AppConfig;
use bookify_db::repositories::{
    CalendarEventRepository, ConnectionRepository, ProviderRepository, Repositories,
};
use bookify_db::DbClient;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::connections::ConnectionService;
use crate::orchestrator::SyncOrchestrator;
use crate::tokens::TokenLifecycleManager;

/// Adapter whose answers are set up by the test, with call counters.
pub(crate) struct ScriptedAdapter {
    pub platform: Platform,
    events: Mutex<HashMap<String, Vec<NormalizedEvent>>>,
    failing_calendars: Mutex<HashMap<String, AdapterError>>,
    rejections_left: Mutex<usize>,
    refresh_error: Mutex<Option<AdapterError>>,
    delay: Mutex<Option<std::time::Duration>>,
    refresh_delay: Mutex<Option<std::time::Duration>>,
    list_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(platform: Platform) -> Arc<Self> {
        Arc::new(Self {
            platform,
            events: Mutex::new(HashMap::new()),
            failing_calendars: Mutex::new(HashMap::new()),
            rejections_left: Mutex::new(0),
            refresh_error: Mutex::new(None),
            delay: Mutex::new(None),
            refresh_delay: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_events(&self, calendar_id: &str, events: Vec<NormalizedEvent>) {
        self.events
            .lock()
            .unwrap()
            .insert(calendar_id.to_string(), events);
    }

    pub fn fail_calendar(&self, calendar_id: &str, error: AdapterError) {
        self.failing_calendars
            .lock()
            .unwrap()
            .insert(calendar_id.to_string(), error);
    }

    /// The next `count` fetches answer `AuthExpired`.
    pub fn reject_next(&self, count: usize) {
        *self.rejections_left.lock().unwrap() = count;
    }

    pub fn fail_refresh(&self, error: AdapterError) {
        *self.refresh_error.lock().unwrap() = Some(error);
    }

    pub fn slow_down(&self, delay: std::time::Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn slow_refresh(&self, delay: std::time::Duration) {
        *self.refresh_delay.lock().unwrap() = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn connect(&self, _request: ConnectRequest) -> Result<TokenGrant, AdapterError> {
        Ok(TokenGrant {
            access_token: "connected-token".to_string(),
            refresh_token: Some("connected-refresh".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            account_email: Some("provider@example.com".to_string()),
        })
    }

    async fn list_events(
        &self,
        _credential: &Credential,
        calendar_id: &str,
        range: DateRange,
        _provider_tz: Tz,
    ) -> Result<Vec<NormalizedEvent>, AdapterError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut rejections = self.rejections_left.lock().unwrap();
            if *rejections > 0 {
                *rejections -= 1;
                return Err(AdapterError::AuthExpired("401 Unauthorized".to_string()));
            }
        }
        if let Some(error) = self.failing_calendars.lock().unwrap().get(calendar_id) {
            return Err(error.clone());
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(calendar_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| range.overlaps(e.start_time, e.end_time))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant, AdapterError> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.refresh_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.refresh_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(TokenGrant {
            access_token: format!("refreshed-{}", call),
            refresh_token: None,
            expires_at: Some(Utc::now() + Duration::hours(1)),
            account_email: None,
        })
    }

    async fn disconnect(&self, _credential: &Credential) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Tomorrow at `hour`:00 UTC; stable for the duration of a test.
pub(crate) fn tomorrow_at(hour: u32) -> DateTime<Utc> {
    let date = (Utc::now() + Duration::days(1)).date_naive();
    date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
        .and_utc()
}

pub(crate) fn event(id: &str, start: DateTime<Utc>, minutes: i64) -> NormalizedEvent {
    NormalizedEvent {
        remote_event_id: id.to_string(),
        title: Some(format!("Busy {}", id)),
        location: None,
        start_time: start,
        end_time: start + Duration::minutes(minutes),
        is_all_day: false,
    }
}

pub(crate) struct Fixture {
    pub repos: Repositories,
    pub provider: Provider,
    pub adapter: Arc<ScriptedAdapter>,
    pub tokens: TokenLifecycleManager,
    pub orchestrator: SyncOrchestrator,
    pub connections: ConnectionService,
}

pub(crate) async fn fixture(platform: Platform) -> Fixture {
    let db = DbClient::in_memory().await.expect("in-memory database");
    let repos = Repositories::new(&db);
    let provider = repos
        .providers
        .create_provider(Provider::new("Dr. Keller", "Europe/Zurich"))
        .await
        .unwrap();

    let config = AppConfig::default();
    let adapter = ScriptedAdapter::new(platform);
    let registry = AdapterRegistry::new().with_adapter(adapter.clone());
    let tokens =
        TokenLifecycleManager::new(repos.connections.clone(), registry.clone(), &config.sync);
    let orchestrator =
        SyncOrchestrator::new(repos.clone(), registry.clone(), tokens.clone(), &config);
    let connections = ConnectionService::new(
        repos.connections.clone(),
        repos.providers.clone(),
        registry,
        tokens.clone(),
    );

    Fixture {
        repos,
        provider,
        adapter,
        tokens,
        orchestrator,
        connections,
    }
}

impl Fixture {
    /// Active connection with a token valid for another hour.
    pub async fn connection(&self, calendars: &[&str]) -> CalendarConnection {
        let mut connection =
            CalendarConnection::new(self.provider.id, self.adapter.platform, "access-1");
        connection.refresh_token = Some("refresh-1".to_string());
        connection.token_expires_at = Some(Utc::now() + Duration::hours(1));
        connection.calendars = calendars.iter().map(|id| CalendarSettings::new(*id)).collect();
        self.repos
            .connections
            .insert_connection(connection)
            .await
            .unwrap()
    }

    pub async fn reload(&self, connection_id: uuid::Uuid) -> CalendarConnection {
        self.repos
            .connections
            .find_connection(connection_id)
            .await
            .unwrap()
            .unwrap()
    }

    /// Remote ids of every cached event of the provider, sorted.
    pub async fn cached_ids(&self) -> Vec<String> {
        let now = Utc::now();
        let mut ids: Vec<String> = self
            .repos
            .events
            .find_for_provider_in_range(
                self.provider.id,
                now - Duration::days(30),
                now + Duration::days(400),
            )
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.remote_event_id)
            .collect();
        ids.sort();
        ids
    }
}
