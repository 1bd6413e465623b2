// --- File: crates/bookify_availability/src/handlers.rs ---
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Json,
};
use bookify_common::models::{parse_hhmm, Provider};
use bookify_common::{validation_error, BookifyError};
use bookify_sync::SyncOrchestrator;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::resolver::AvailabilityResolver;
use crate::slots::Slot;

#[derive(Clone)]
pub struct AvailabilityState {
    pub resolver: AvailabilityResolver,
    pub orchestrator: SyncOrchestrator,
    /// Sync the provider's calendars for the requested day before every lookup.
    pub sync_on_lookup: bool,
}

#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub provider_id: Uuid,
    /// Provider-local date, YYYY-MM-DD
    pub date: NaiveDate,
    /// Minutes; defaults to the provider's default duration
    pub duration: Option<i64>,
    pub location_id: Option<Uuid>,
    /// Fetch fresh calendar data for the day first
    #[serde(default)]
    pub refresh: bool,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Serialize)]
pub struct AvailableSlotsResponse {
    pub available_slots: Vec<Slot>,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize)]
pub struct AvailabilityCheckRequest {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    /// "HH:MM" provider-local
    pub start_time: String,
    pub duration: Option<i64>,
    pub location_id: Option<Uuid>,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Serialize)]
pub struct AvailabilityCheckResponse {
    pub is_available: bool,
}

fn resolve_duration(provider: &Provider, requested: Option<i64>) -> Result<i64, BookifyError> {
    let duration = requested.unwrap_or(provider.default_duration_minutes);
    if !provider.allows_duration(duration) {
        return Err(validation_error(format!(
            "duration {} is not offered by this provider",
            duration
        )));
    }
    Ok(duration)
}

/// Lists bookable slots for one provider-local day.
#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/availability",
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "Bookable slots in start order", body = AvailableSlotsResponse),
        (status = 400, description = "Invalid duration"),
        (status = 404, description = "Unknown provider")
    ),
    tag = "Availability"
))]
pub async fn get_availability_handler(
    State(state): State<Arc<AvailabilityState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailableSlotsResponse>, BookifyError> {
    let provider = state.resolver.provider(query.provider_id).await?;
    let duration = resolve_duration(&provider, query.duration)?;

    if query.refresh || state.sync_on_lookup {
        let report = state
            .orchestrator
            .sync_for_booking_lookup(provider.id, query.date)
            .await;
        if !report.is_success() {
            // stale cache is still usable
            warn!(
                provider_id = %provider.id,
                "Lookup sync incomplete for {}, answering from cache",
                query.date
            );
        }
    }

    let available_slots = state
        .resolver
        .get_available_slots(provider.id, query.date, duration, query.location_id)
        .await?;
    Ok(Json(AvailableSlotsResponse { available_slots }))
}

#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/availability/check",
    request_body = AvailabilityCheckRequest,
    responses(
        (status = 200, description = "Whether the exact slot can be booked", body = AvailabilityCheckResponse),
        (status = 400, description = "Invalid start time or duration"),
        (status = 404, description = "Unknown provider")
    ),
    tag = "Availability"
))]
pub async fn check_availability_handler(
    State(state): State<Arc<AvailabilityState>>,
    Json(request): Json<AvailabilityCheckRequest>,
) -> Result<Json<AvailabilityCheckResponse>, BookifyError> {
    let start_time = parse_hhmm(&request.start_time)
        .ok_or_else(|| validation_error("start_time must be HH:MM"))?;
    let provider = state.resolver.provider(request.provider_id).await?;
    let duration = resolve_duration(&provider, request.duration)?;

    let is_available = state
        .resolver
        .is_available(
            provider.id,
            request.date,
            start_time,
            duration,
            request.location_id,
        )
        .await?;
    Ok(Json(AvailabilityCheckResponse { is_available }))
}
