//! PulseMQ Server - In-memory message queue over HTTP RPC.
//!
//! This binary owns the single queue for the lifetime of the process:
//! - Serves produce/consume RPCs and WebSocket producer/consumer streams
//! - Samples queue throughput for `/stats` and the Prometheus `/metrics` scrape
//! - Shuts down gracefully on SIGINT/SIGTERM (queued messages are dropped)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pulsemq::{
    install_prometheus, web, AppState, Config, QueueMetrics, QueueService, QueueStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        listen_addr = %config.listen_addr(),
        max_queue_len = ?config.max_queue_len,
        max_payload_bytes = config.max_payload_bytes,
        max_blocking_consume_ms = config.max_blocking_consume.as_millis() as u64,
        "config_loaded"
    );

    let prometheus = install_prometheus().context("Failed to install Prometheus recorder")?;

    // The queue lives exactly as long as the process
    let store = Arc::new(QueueStore::new(config.max_queue_len));
    info!(max_len = ?store.max_len(), "queue_created");
    let service = QueueService::new(Arc::clone(&store), Arc::new(QueueMetrics::new()));

    let sampler = tokio::spawn(sample_metrics(
        service.clone(),
        prometheus.clone(),
        config.stats_sample_interval,
    ));

    let listen_addr = config.listen_addr();
    let state = AppState::new(config, service, prometheus);
    let app = web::router(state);

    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {listen_addr}"))?;

    info!(address = %listen_addr, "server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sampler.abort();

    info!(dropped_messages = store.len(), "server_shutdown_complete");

    Ok(())
}

/// Refresh throughput and depth once per period and run exporter upkeep.
async fn sample_metrics(service: QueueService, prometheus: PrometheusHandle, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        service.sample(period);
        prometheus.run_upkeep();
    }
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("server_shutting_down");
}
