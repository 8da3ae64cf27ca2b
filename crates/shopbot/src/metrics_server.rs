//! HTTP server exposing the payment metrics for Prometheus scraping
//!
//! Endpoints:
//! - `/metrics` - Prometheus text exposition format
//! - `/health` - liveness check with uptime

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Instant;

struct AppState {
    registry: Registry,
    start_time: Instant,
}

/// Routes of the metrics server, reading from `registry`.
pub fn router(registry: Registry) -> Router {
    let state = AppState {
        registry,
        start_time: Instant::now(),
    };

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

/// Binds `0.0.0.0:port` and serves until the process exits.
pub async fn start_metrics_server(port: u16, registry: Registry) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);
    axum::serve(listener, router(registry)).await
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&state.registry.gather(), &mut buffer) {
        Ok(()) => ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode metrics: {e}")).into_response()
        }
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "service": "shopbot",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(health))
}
