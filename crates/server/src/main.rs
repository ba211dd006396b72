use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use shared::protocol::PROCESS_ROUTE;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};
use tracing::info;

mod app_state;
mod attendance;
mod config;
mod process;

use app_state::AppState;
use config::{load_settings, prepare_output_dir, prepare_upload_dir};
use process::process_upload;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let upload_dir = prepare_upload_dir(&settings.upload_dir)?;
    let output_dir = prepare_output_dir(&settings.output_dir)?;
    info!(
        upload_dir = %upload_dir.display(),
        output_dir = %output_dir.display(),
        "directories ready"
    );

    let state = AppState {
        upload_dir,
        output_dir,
    };
    let app = build_router(Arc::new(state), settings.max_upload_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(PROCESS_ROUTE, post(process_upload))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
#[path = "tests/fixtures.rs"]
mod fixtures;

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
