// --- File: crates/services/bookify_backend/src/app_state.rs ---
use std::sync::Arc;

use bookify_availability::handlers::AvailabilityState;
use bookify_availability::AvailabilityResolver;
use bookify_booking::handlers::BookingState;
use bookify_booking::{BookingGuard, Notifier};
use bookify_calendar::AdapterRegistry;
use bookify_common::services::LoggingNotificationService;
use bookify_config::AppConfig;
use bookify_db::{DbClient, Repositories};
use bookify_sync::handlers::CalendarState;
use bookify_sync::{ConnectionService, SyncOrchestrator, TokenLifecycleManager};
use tracing::info;

/// Everything the routers need, wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbClient,
    pub calendar: Arc<CalendarState>,
    pub availability: Arc<AvailabilityState>,
    pub booking: Arc<BookingState>,
}

impl AppState {
    /// Builds the services around `db` with the given adapters and notification channel.
    pub fn new(
        config: Arc<AppConfig>,
        db: DbClient,
        adapters: AdapterRegistry,
        notifier: Notifier,
    ) -> Self {
        info!("Calendar platforms enabled: {:?}", adapters.platforms());
        let repos = Repositories::new(&db);

        let tokens =
            TokenLifecycleManager::new(repos.connections.clone(), adapters.clone(), &config.sync);
        let orchestrator =
            SyncOrchestrator::new(repos.clone(), adapters.clone(), tokens.clone(), &config);
        let connections = ConnectionService::new(
            repos.connections.clone(),
            repos.providers.clone(),
            adapters,
            tokens,
        );
        let resolver = AvailabilityResolver::new(repos, &config);
        let guard = BookingGuard::new(db.clone(), resolver.clone(), notifier);

        Self {
            calendar: Arc::new(CalendarState {
                orchestrator: orchestrator.clone(),
                connections,
            }),
            availability: Arc::new(AvailabilityState {
                resolver,
                orchestrator,
                sync_on_lookup: config.sync.sync_on_lookup,
            }),
            booking: Arc::new(BookingState { guard }),
            config,
            db,
        }
    }

    /// Production wiring: adapters from configuration, notifications to the log.
    pub fn from_config(
        config: Arc<AppConfig>,
        db: DbClient,
    ) -> Result<Self, bookify_calendar::AdapterError> {
        let adapters = AdapterRegistry::from_config(&config)?;
        Ok(Self::new(
            config,
            db,
            adapters,
            Arc::new(LoggingNotificationService),
        ))
    }
}
