// --- File: crates/services/bookify_backend/src/router.rs ---
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use bookify_db::DbClient;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
}

#[axum::debug_handler]
async fn health_handler(State(db): State<DbClient>) -> (StatusCode, Json<HealthResponse>) {
    if db.is_healthy().await {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded",
                database: false,
            }),
        )
    }
}

/// The full application: every API router under `/api`, plus Swagger UI with `openapi`.
pub fn build_router(state: &AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(health_handler))
        .with_state(state.db.clone())
        .merge(bookify_sync::routes::routes(state.calendar.clone()))
        .merge(bookify_availability::routes::routes(
            state.availability.clone(),
        ))
        .merge(bookify_booking::routes::routes(state.booking.clone()));

    #[allow(unused_mut)] // only mutated with the openapi feature
    let mut app = Router::new().nest("/api", api_router);

    #[cfg(feature = "openapi")]
    {
        use bookify_availability::doc::AvailabilityApiDoc;
        use bookify_booking::doc::BookingApiDoc;
        use bookify_sync::doc::CalendarApiDoc;
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;

        #[derive(OpenApi)]
        #[openapi(
            info(
                title = "Bookify API",
                version = "0.1.0",
                description = "Availability, calendar sync and booking endpoints"
            ),
            servers((url = "/api", description = "Main API Prefix")),
        )]
        struct ApiDoc;

        let mut openapi_doc = ApiDoc::openapi();
        openapi_doc.merge(CalendarApiDoc::openapi());
        openapi_doc.merge(AvailabilityApiDoc::openapi());
        openapi_doc.merge(BookingApiDoc::openapi());
        tracing::info!("Adding Swagger UI at /api/docs");

        app = app.merge(SwaggerUi::new("/api/docs").url("/api/docs/openapi.json", openapi_doc));
    }

    app.layer(TraceLayer::new_for_http())
}
