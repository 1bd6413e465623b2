// --- File: crates/bookify_availability/src/routes.rs ---

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{check_availability_handler, get_availability_handler, AvailabilityState};

pub fn routes(state: Arc<AvailabilityState>) -> Router {
    Router::new()
        .route("/availability", get(get_availability_handler))
        .route("/availability/check", post(check_availability_handler))
        .with_state(state)
}
