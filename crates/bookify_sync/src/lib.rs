// --- File: crates/bookify_sync/src/lib.rs ---

//! Keeps the local event cache in step with the providers' calendars.
//!
//! [`SyncOrchestrator`] fetches through the platform adapters and reconciles the cache,
//! [`TokenLifecycleManager`] keeps OAuth credentials usable, and [`ConnectionService`]
//! creates and removes connections.

pub mod connections;
pub mod doc;
pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod routes;
#[cfg(test)]
mod test_support;
pub mod tokens;

pub use connections::{ConnectionService, NewConnection};
pub use error::SyncError;
pub use orchestrator::{
    CalendarSyncResult, ConnectionSyncReport, SyncOrchestrator, SyncOutcome, SyncReport,
    SyncState,
};
pub use tokens::TokenLifecycleManager;
