// --- File: crates/bookify_booking/src/handlers.rs ---
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use bookify_common::models::{parse_hhmm, Booking};
use bookify_common::{validation_error, BookifyError};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::guard::{BookingGuard, CustomerDetails, NewBooking, NewSlotBooking};

#[derive(Clone)]
pub struct BookingState {
    pub guard: BookingGuard,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub provider_id: Uuid,
    pub calendar_event_id: Uuid,
    pub customer: CustomerDetails,
    pub service_type: Option<String>,
    pub notes: Option<String>,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize)]
pub struct CreateSlotBookingRequest {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    /// "HH:MM" provider-local
    pub start_time: String,
    pub duration: Option<i64>,
    pub location_id: Option<Uuid>,
    pub customer: CustomerDetails,
    pub service_type: Option<String>,
    pub notes: Option<String>,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub provider_id: Uuid,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize)]
pub struct RescheduleBookingRequest {
    pub provider_id: Uuid,
    pub calendar_event_id: Uuid,
}

/// Books a seat on an appointment event.
#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/booking",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = Booking),
        (status = 400, description = "Bookings disabled for the event or invalid input"),
        (status = 404, description = "Event not found"),
        (status = 409, description = "Event is fully booked")
    ),
    tag = "Booking"
))]
pub async fn create_booking_handler(
    State(state): State<Arc<BookingState>>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), BookifyError> {
    let booking = state
        .guard
        .create_booking(NewBooking {
            provider_id: request.provider_id,
            calendar_event_id: request.calendar_event_id,
            customer: request.customer,
            service_type: request.service_type,
            notes: request.notes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// Books a free template slot.
#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/booking/slot",
    request_body = CreateSlotBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = Booking),
        (status = 400, description = "Invalid input or duration not offered"),
        (status = 404, description = "Provider not found"),
        (status = 409, description = "Slot is no longer free")
    ),
    tag = "Booking"
))]
pub async fn create_slot_booking_handler(
    State(state): State<Arc<BookingState>>,
    Json(request): Json<CreateSlotBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), BookifyError> {
    let start_time = parse_hhmm(&request.start_time)
        .ok_or_else(|| validation_error("start_time must be HH:MM"))?;
    let booking = state
        .guard
        .create_slot_booking(NewSlotBooking {
            provider_id: request.provider_id,
            date: request.date,
            start_time,
            duration_minutes: request.duration,
            location_id: request.location_id,
            customer: request.customer,
            service_type: request.service_type,
            notes: request.notes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/booking/{id}/cancel",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = CancelBookingRequest,
    responses(
        (status = 200, description = "Booking cancelled", body = Booking),
        (status = 400, description = "Booking is not active"),
        (status = 404, description = "Booking not found")
    ),
    tag = "Booking"
))]
pub async fn cancel_booking_handler(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<Booking>, BookifyError> {
    let booking = state
        .guard
        .cancel_booking(request.provider_id, booking_id)
        .await?;
    Ok(Json(booking))
}

#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/booking/{id}/reschedule",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = RescheduleBookingRequest,
    responses(
        (status = 201, description = "Replacement booking created", body = Booking),
        (status = 400, description = "Booking not active or target disallows bookings"),
        (status = 404, description = "Booking or event not found"),
        (status = 409, description = "Target event is fully booked")
    ),
    tag = "Booking"
))]
pub async fn reschedule_booking_handler(
    State(state): State<Arc<BookingState>>,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<RescheduleBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), BookifyError> {
    let booking = state
        .guard
        .reschedule_booking(request.provider_id, booking_id, request.calendar_event_id)
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}
