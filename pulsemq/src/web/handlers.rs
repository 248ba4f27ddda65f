//! Unary RPC endpoint handlers.
//!
//! Every queue outcome (delivered, empty, full, exhausted) is returned as a
//! 200 response carrying the RPC message. Malformed bodies are rejected by
//! the `Json` extractor before reaching these handlers.

use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tracing::debug;

use crate::queue::{
    BlockingConsumeRequest, ConsumeRequest, ConsumeResponse, ProduceRequest, ProduceResponse,
    QueueStats,
};
use crate::service::QueueService;
use crate::Config;

/// Content type of the Prometheus text exposition format.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: QueueService,
    pub prometheus: PrometheusHandle,
}

impl AppState {
    pub fn new(config: Config, service: QueueService, prometheus: PrometheusHandle) -> Self {
        Self {
            config: Arc::new(config),
            service,
            prometheus,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Produce / Consume
// =============================================================================

/// `Produce` RPC.
pub async fn produce(
    State(state): State<AppState>,
    Json(request): Json<ProduceRequest>,
) -> Json<ProduceResponse> {
    let payload_length = request.payload.len();
    let response = state.service.produce(request);

    debug!(payload_length, success = response.success, "rpc_produce");

    Json(response)
}

/// `Consume` RPC. Never waits for a message.
pub async fn consume(
    State(state): State<AppState>,
    Json(request): Json<ConsumeRequest>,
) -> Json<ConsumeResponse> {
    let response = state.service.consume(request);

    debug!(
        delivered = response.is_delivered(),
        payload_length = response.payload.len(),
        "rpc_consume"
    );

    Json(response)
}

/// Consume that waits up to the requested timeout for a message.
pub async fn consume_blocking(
    State(state): State<AppState>,
    Json(request): Json<BlockingConsumeRequest>,
) -> Json<ConsumeResponse> {
    let response = state
        .service
        .consume_blocking(request, state.config.max_blocking_consume)
        .await;

    debug!(
        timeout_ms = request.timeout_ms,
        delivered = response.is_delivered(),
        "rpc_consume_blocking"
    );

    Json(response)
}

// =============================================================================
// Stats / Metrics
// =============================================================================

/// Queue counters and throughput.
pub async fn stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.service.stats())
}

/// Prometheus scrape endpoint.
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.prometheus.render(),
    )
}
