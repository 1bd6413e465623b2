//! Repository modules for database access
//!
//! One module per aggregate. Each exposes a repository trait and its SQL implementation.

pub mod booking;
pub mod calendar_event;
pub mod connection;
pub mod provider;
pub mod template;

pub use booking::{BookingRepository, SqlBookingRepository};
pub use calendar_event::{
    CalendarEventRepository, EventUpsert, PruneScope, SqlCalendarEventRepository,
};
pub use connection::{ConnectionRepository, SqlConnectionRepository, TokenUpdate};
pub use provider::{ProviderRepository, SqlProviderRepository};
pub use template::{SqlTemplateRepository, TemplateRepository};

use crate::DbClient;

/// Every SQL repository over one shared client.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub providers: SqlProviderRepository,
    pub connections: SqlConnectionRepository,
    pub events: SqlCalendarEventRepository,
    pub templates: SqlTemplateRepository,
    pub bookings: SqlBookingRepository,
}

impl Repositories {
    pub fn new(db_client: &DbClient) -> Self {
        Self {
            providers: SqlProviderRepository::new(db_client.clone()),
            connections: SqlConnectionRepository::new(db_client.clone()),
            events: SqlCalendarEventRepository::new(db_client.clone()),
            templates: SqlTemplateRepository::new(db_client.clone()),
            bookings: SqlBookingRepository::new(db_client.clone()),
        }
    }
}
