//! Recording notifier and database fixture shared by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use bookify_availability::AvailabilityResolver;
use bookify_common::models::{
    AvailabilityTemplate, CalendarConnection, CalendarSettings, Platform, Provider, TimeSlot,
};
use bookify_common::services::{
    BookingNotice, BoxFuture, BoxedError, NotificationResult, NotificationService,
};
use bookify_config::AppConfig;
use bookify_db::repositories::{
    CalendarEventRepository, ConnectionRepository, EventUpsert, ProviderRepository, Repositories,
    TemplateRepository,
};
use bookify_db::DbClient;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use crate::guard::{BookingGuard, CustomerDetails};

/// Keeps every notice it is handed; optionally fails each call afterwards.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<(&'static str, BookingNotice)>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            notices: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.notices.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }

    pub fn last(&self) -> Option<BookingNotice> {
        self.notices.lock().unwrap().last().map(|(_, n)| n.clone())
    }

    /// Notices are sent from spawned tasks; give them a moment to land.
    pub async fn wait_for(&self, count: usize) {
        for _ in 0..200 {
            if self.notices.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
    }

    fn record(
        &self,
        kind: &'static str,
        notice: BookingNotice,
    ) -> BoxFuture<'_, NotificationResult, BoxedError> {
        let id = format!("{}-{}", kind, notice.booking_id);
        self.notices.lock().unwrap().push((kind, notice));
        let failing = self.failing;
        Box::pin(async move {
            if failing {
                return Err(BoxedError("mail relay unreachable".into()));
            }
            Ok(NotificationResult {
                id,
                status: "sent".to_string(),
            })
        })
    }
}

impl NotificationService for RecordingNotifier {
    type Error = BoxedError;

    fn booking_confirmed(
        &self,
        notice: BookingNotice,
    ) -> BoxFuture<'_, NotificationResult, BoxedError> {
        self.record("confirmed", notice)
    }

    fn booking_rescheduled(
        &self,
        notice: BookingNotice,
    ) -> BoxFuture<'_, NotificationResult, BoxedError> {
        self.record("rescheduled", notice)
    }

    fn booking_cancelled(
        &self,
        notice: BookingNotice,
    ) -> BoxFuture<'_, NotificationResult, BoxedError> {
        self.record("cancelled", notice)
    }
}

pub(crate) struct Fixture {
    pub repos: Repositories,
    pub provider: Provider,
    pub connection: CalendarConnection,
    pub notifier: Arc<RecordingNotifier>,
    pub guard: BookingGuard,
    _dir: Option<TempDir>,
}

impl Fixture {
    /// Caches an event at `start` and sets its booking policy.
    pub async fn appointment(
        &self,
        start: DateTime<Utc>,
        allow_bookings: bool,
        max: i64,
    ) -> Uuid {
        let remote_id = Uuid::new_v4().to_string();
        self.repos
            .events
            .upsert_events(
                self.provider.id,
                self.connection.id,
                "primary",
                &[EventUpsert {
                    remote_event_id: remote_id.clone(),
                    title: Some("Consultation".to_string()),
                    location: None,
                    start_time: start,
                    end_time: start + Duration::minutes(45),
                    is_all_day: false,
                }],
                Utc::now(),
            )
            .await
            .unwrap();
        let event_id = self
            .repos
            .events
            .find_for_provider_in_range(self.provider.id, start, start + Duration::minutes(1))
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.remote_event_id == remote_id)
            .map(|e| e.id)
            .expect("cached event");
        self.repos
            .events
            .set_booking_policy(self.provider.id, event_id, allow_bookings, max)
            .await
            .unwrap();
        event_id
    }
}

/// A week from now, so neither "past" nor beyond the booking horizon.
pub(crate) fn next_week() -> NaiveDate {
    Utc::now().date_naive() + Duration::days(7)
}

pub(crate) fn in_days(days: i64, hour: u32) -> DateTime<Utc> {
    (Utc::now().date_naive() + Duration::days(days))
        .and_hms_opt(hour, 0, 0)
        .unwrap()
        .and_utc()
}

pub(crate) fn customer(email: &str) -> CustomerDetails {
    CustomerDetails {
        email: email.to_string(),
        name: Some("Nora Frei".to_string()),
        phone: None,
    }
}

pub(crate) async fn fixture() -> Fixture {
    fixture_with(RecordingNotifier::default()).await
}

pub(crate) async fn fixture_with(notifier: RecordingNotifier) -> Fixture {
    let db = DbClient::in_memory().await.expect("in-memory db");
    build(db, None, notifier, 0).await
}

/// Same setup on a WAL database file with a real connection pool, so
/// concurrent transactions actually contend for the write lock.
pub(crate) async fn file_fixture(buffer_minutes: i64) -> Fixture {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("bookify.db").display());
    let db = DbClient::from_url(&url).await.expect("file db");
    db.init_schema().await.expect("schema");
    build(db, Some(dir), RecordingNotifier::default(), buffer_minutes).await
}

async fn build(
    db: DbClient,
    dir: Option<TempDir>,
    notifier: RecordingNotifier,
    buffer_minutes: i64,
) -> Fixture {
    let repos = Repositories::new(&db);

    let mut provider = Provider::new("Physio Meier", "Europe/Zurich");
    provider.allowed_durations = vec![30, 60];
    provider.buffer_minutes = buffer_minutes;
    let provider = repos.providers.create_provider(provider).await.unwrap();
    let template = repos
        .templates
        .create_template(AvailabilityTemplate::new(
            provider.id,
            "Every day",
            (0..=6).map(|dow| TimeSlot::new(dow, "08:00", "18:00")).collect(),
        ))
        .await
        .unwrap();
    repos
        .templates
        .set_default_template(provider.id, template.id)
        .await
        .unwrap();

    let mut connection = CalendarConnection::new(provider.id, Platform::Google, "token");
    connection.calendars = vec![CalendarSettings::new("primary")];
    let connection = repos.connections.insert_connection(connection).await.unwrap();

    let notifier = Arc::new(notifier);
    let resolver = AvailabilityResolver::new(repos.clone(), &AppConfig::default());
    let guard = BookingGuard::new(db, resolver, notifier.clone());

    Fixture {
        repos,
        provider,
        connection,
        notifier,
        guard,
        _dir: dir,
    }
}
