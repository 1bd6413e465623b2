// --- File: crates/bookify_sync/src/routes.rs ---

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::handlers::{
    connect_handler, connection_state_handler, disconnect_handler, set_default_handler,
    sync_handler, webhook_handler, CalendarState,
};

/// Calendar connection and sync routes, relative to `/api`.
pub fn routes(state: Arc<CalendarState>) -> Router {
    Router::new()
        .route("/calendar/sync", post(sync_handler))
        .route("/calendar/connections", post(connect_handler))
        .route("/calendar/connections/{id}", delete(disconnect_handler))
        .route(
            "/calendar/connections/{id}/state",
            get(connection_state_handler),
        )
        .route("/calendar/connections/{id}/default", put(set_default_handler))
        .route("/calendar/webhook/{id}", post(webhook_handler))
        .with_state(state)
}
