//! HTTP transport for the queue service.
//!
//! This module exposes:
//! - Unary JSON RPC endpoints (`/rpc/produce`, `/rpc/consume`,
//!   `/rpc/consume_blocking`)
//! - WebSocket endpoints for long-lived producers and consumers
//! - Health, JSON stats and Prometheus metrics endpoints

pub mod handlers;
pub mod stream;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Path of the Prometheus scrape endpoint.
pub const METRICS_PATH: &str = "/metrics";

pub use handlers::{
    consume, consume_blocking, health, produce, prometheus_metrics, stats, AppState,
    HealthResponse,
};
pub use stream::{ws_consume, ws_publish, ws_stream};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_payload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route(METRICS_PATH, get(prometheus_metrics))
        .route("/rpc/produce", post(produce))
        .route("/rpc/consume", post(consume))
        .route("/rpc/consume_blocking", post(consume_blocking))
        .route("/ws/publish", get(ws_publish))
        .route("/ws/consume", get(ws_consume))
        .route("/ws/stream", get(ws_stream))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
