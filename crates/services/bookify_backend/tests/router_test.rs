use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bookify_backend::{build_router, AppState};
use bookify_calendar::AdapterRegistry;
use bookify_common::services::LoggingNotificationService;
use bookify_config::AppConfig;
use bookify_db::DbClient;
use serde_json::Value;
use tower::ServiceExt;

async fn app() -> Router {
    let db = DbClient::in_memory().await.expect("in-memory db");
    let state = AppState::new(
        Arc::new(AppConfig::default()),
        db,
        AdapterRegistry::new(),
        Arc::new(LoggingNotificationService),
    );
    build_router(&state)
}

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let response = app().await.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_reports_database() {
    let request = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
}

#[tokio::test]
async fn availability_is_mounted_under_api() {
    let uri = format!(
        "/api/availability?provider_id={}&date=2030-01-07",
        uuid::Uuid::new_v4()
    );
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 404);
}

#[tokio::test]
async fn calendar_sync_is_mounted_under_api() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/calendar/sync")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn booking_is_mounted_under_api() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/booking")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "provider_id": uuid::Uuid::new_v4(),
                "calendar_event_id": uuid::Uuid::new_v4(),
                "customer": { "email": "nora@example.com" }
            })
            .to_string(),
        ))
        .unwrap();
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_paths_are_not_routed() {
    let request = Request::builder()
        .uri("/availability")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
