// File: crates/bookify_sync/src/doc.rs
#![cfg(feature = "openapi")]

use utoipa::OpenApi;

use crate::handlers::{
    ConnectCalendarRequest, ConnectionStateResponse, DefaultConnectionResponse,
    SetDefaultRequest, SyncRequest, SyncResponse,
};
use crate::orchestrator::{CalendarSyncResult, ConnectionSyncReport, SyncOutcome, SyncState};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::sync_handler,
        crate::handlers::connection_state_handler,
        crate::handlers::connect_handler,
        crate::handlers::disconnect_handler,
        crate::handlers::set_default_handler,
        crate::handlers::webhook_handler
    ),
    components(
        schemas(
            SyncRequest,
            SyncResponse,
            ConnectionSyncReport,
            CalendarSyncResult,
            SyncOutcome,
            SyncState,
            ConnectionStateResponse,
            ConnectCalendarRequest,
            SetDefaultRequest,
            DefaultConnectionResponse
        )
    ),
    tags(
        (name = "Calendar", description = "Calendar connections and sync")
    ),
    servers(
        (url = "/api", description = "Bookify API server")
    )
)]
pub struct CalendarApiDoc;
