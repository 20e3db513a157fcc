//! HTTP surface for the mood pipeline.

mod error;
mod handlers;

use crate::pipeline::MoodPipeline;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::{codes, ApiError, ErrorBody};
pub use handlers::HealthResponse;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<MoodPipeline>,
}

impl AppState {
    pub fn new(pipeline: MoodPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/process_audio", post(handlers::process_audio))
        .route("/health", get(handlers::health))
        .route("/favicon.ico", get(handlers::favicon))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until ctrl-c.
pub async fn run_server(
    state: AppState,
    addr: SocketAddr,
    max_upload_bytes: usize,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "voice-mood listening");
    axum::serve(listener, build_router(state, max_upload_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c, serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
