// --- File: crates/bookify_booking/src/routes.rs ---

use std::sync::Arc;

use axum::{routing::post, Router};

use crate::handlers::{
    cancel_booking_handler, create_booking_handler, create_slot_booking_handler,
    reschedule_booking_handler, BookingState,
};

pub fn routes(state: Arc<BookingState>) -> Router {
    Router::new()
        .route("/booking", post(create_booking_handler))
        .route("/booking/slot", post(create_slot_booking_handler))
        .route("/booking/{id}/cancel", post(cancel_booking_handler))
        .route("/booking/{id}/reschedule", post(reschedule_booking_handler))
        .with_state(state)
}
