// File: services/bookify_backend/src/main.rs
use std::sync::Arc;

use bookify_backend::{build_router, AppState};
use bookify_common::logging::{self, log_error, log_result};
use bookify_common::Context;
use bookify_config::load_config;
use bookify_db::DbClient;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(load_config()?);
    // keep the guard alive or buffered file logs are lost
    let _log_guard = logging::init_from_config(
        config.logging.level.as_deref(),
        config.logging.directory.as_deref(),
    );

    let db = DbClient::new(&config)
        .await
        .inspect_err(|e| log_error(e, "Database unavailable"))?;
    log_result(
        db.init_schema().await,
        "Database schema ready",
        "Schema setup failed",
    )?;

    let state = AppState::from_config(config.clone(), db)?;
    let app = build_router(&state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Starting server at http://{}", addr);
    info!("API endpoints available at http://{}/api", addr);

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
