// --- File: crates/bookify_sync/src/handlers.rs ---
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use bookify_calendar::ConnectRequest;
use bookify_common::models::{CalendarConnection, CalendarSettings, Platform};
use bookify_common::{validation_error, BookifyError};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::connections::{ConnectionService, NewConnection};
use crate::orchestrator::{ConnectionSyncReport, SyncOrchestrator, SyncState};

// Shared state for the calendar routes
#[derive(Clone)]
pub struct CalendarState {
    pub orchestrator: SyncOrchestrator,
    pub connections: ConnectionService,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub connection_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    /// Use the long backfill window instead of the regular one.
    #[serde(default)]
    pub backfill: bool,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub results: Vec<ConnectionSyncReport>,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Serialize)]
pub struct ConnectionStateResponse {
    pub connection_id: Uuid,
    pub state: SyncState,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize)]
pub struct ConnectCalendarRequest {
    pub provider_id: Uuid,
    pub platform: Platform,
    pub credentials: ConnectRequest,
    #[serde(default)]
    pub calendars: Vec<CalendarSettings>,
    #[serde(default)]
    pub make_default: bool,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize)]
pub struct SetDefaultRequest {
    pub provider_id: Uuid,
}

#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
#[derive(Debug, Deserialize)]
pub struct ProviderScope {
    /// Provider that owns the connection
    pub provider_id: Uuid,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Serialize)]
pub struct DefaultConnectionResponse {
    pub connection_id: Uuid,
    pub is_default_for_bookings: bool,
}

/// Syncs one connection, or every active connection of a provider.
#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/calendar/sync",
    request_body = SyncRequest,
    responses(
        (status = 200, description = "Per-connection sync reports", body = SyncResponse),
        (status = 400, description = "Neither connection_id nor provider_id given"),
        (status = 404, description = "Unknown connection")
    ),
    tag = "Calendar"
))]
pub async fn sync_handler(
    State(state): State<Arc<CalendarState>>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, BookifyError> {
    let results = match (request.connection_id, request.provider_id) {
        (Some(connection_id), _) => {
            let report = if request.backfill {
                state.orchestrator.backfill_connection(connection_id).await?
            } else {
                state.orchestrator.sync_connection(connection_id).await?
            };
            vec![report]
        }
        (None, Some(provider_id)) => {
            let report = if request.backfill {
                state.orchestrator.backfill_all_calendars(provider_id).await?
            } else {
                state.orchestrator.sync_all_calendars(provider_id).await?
            };
            report.connections
        }
        (None, None) => {
            return Err(validation_error(
                "either connection_id or provider_id is required",
            ))
        }
    };

    Ok(Json(SyncResponse {
        success: results.iter().all(ConnectionSyncReport::is_success),
        results,
    }))
}

#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/calendar/connections/{id}/state",
    params(("id" = Uuid, Path, description = "Calendar connection id")),
    responses(
        (status = 200, description = "Current sync state", body = ConnectionStateResponse),
        (status = 404, description = "Unknown connection")
    ),
    tag = "Calendar"
))]
pub async fn connection_state_handler(
    State(state): State<Arc<CalendarState>>,
    Path(connection_id): Path<Uuid>,
) -> Result<Json<ConnectionStateResponse>, BookifyError> {
    let sync_state = state.orchestrator.state(connection_id).await?;
    Ok(Json(ConnectionStateResponse {
        connection_id,
        state: sync_state,
    }))
}

#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/calendar/connections",
    request_body = ConnectCalendarRequest,
    responses(
        (status = 201, description = "Connection stored", body = CalendarConnection),
        (status = 400, description = "Invalid input or unsupported platform"),
        (status = 401, description = "Platform rejected the credentials")
    ),
    tag = "Calendar"
))]
pub async fn connect_handler(
    State(state): State<Arc<CalendarState>>,
    Json(request): Json<ConnectCalendarRequest>,
) -> Result<(StatusCode, Json<CalendarConnection>), BookifyError> {
    let connection = state
        .connections
        .connect(NewConnection {
            provider_id: request.provider_id,
            platform: request.platform,
            request: request.credentials,
            calendars: request.calendars,
            make_default: request.make_default,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/calendar/connections/{id}",
    params(("id" = Uuid, Path, description = "Calendar connection id"), ProviderScope),
    responses(
        (status = 204, description = "Connection and cached events removed"),
        (status = 404, description = "Unknown connection for this provider")
    ),
    tag = "Calendar"
))]
pub async fn disconnect_handler(
    State(state): State<Arc<CalendarState>>,
    Path(connection_id): Path<Uuid>,
    Query(scope): Query<ProviderScope>,
) -> Result<StatusCode, BookifyError> {
    state
        .connections
        .disconnect(scope.provider_id, connection_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    put,
    path = "/calendar/connections/{id}/default",
    params(("id" = Uuid, Path, description = "Calendar connection id")),
    request_body = SetDefaultRequest,
    responses(
        (status = 200, description = "Connection is now the booking default", body = DefaultConnectionResponse),
        (status = 404, description = "Unknown connection for this provider")
    ),
    tag = "Calendar"
))]
pub async fn set_default_handler(
    State(state): State<Arc<CalendarState>>,
    Path(connection_id): Path<Uuid>,
    Json(request): Json<SetDefaultRequest>,
) -> Result<Json<DefaultConnectionResponse>, BookifyError> {
    state
        .connections
        .set_default_for_bookings(request.provider_id, connection_id)
        .await?;
    Ok(Json(DefaultConnectionResponse {
        connection_id,
        is_default_for_bookings: true,
    }))
}

/// Push notification from a platform: resync the connection it names.
#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/calendar/webhook/{id}",
    params(("id" = Uuid, Path, description = "Calendar connection id")),
    responses(
        (status = 202, description = "Sync ran", body = ConnectionSyncReport),
        (status = 404, description = "Unknown connection")
    ),
    tag = "Calendar"
))]
pub async fn webhook_handler(
    State(state): State<Arc<CalendarState>>,
    Path(connection_id): Path<Uuid>,
) -> Result<(StatusCode, Json<ConnectionSyncReport>), BookifyError> {
    info!(connection_id = %connection_id, "Webhook received");
    let report = state.orchestrator.sync_connection(connection_id).await?;
    Ok((StatusCode::ACCEPTED, Json(report)))
}
