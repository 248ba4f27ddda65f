//! PulseMQ Demo - Produce one message, then consume one message.
//!
//! Targets the server at `PULSEMQ_URL` (default `http://localhost:50051`).
//! Start `pulsemq-server` before running this.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pulsemq::config::server_url_from_env;
use pulsemq::QueueClient;

const DEMO_MESSAGE: &str = "Hello from the PulseMQ Rust client!";

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    let server_url = server_url_from_env();
    let client = QueueClient::new(&server_url).context("Failed to create client")?;
    info!(server_url = %server_url, "demo_starting");

    // Produce a message
    let produced = client
        .produce(DEMO_MESSAGE)
        .await
        .context("Produce call failed")?;
    info!(success = produced.success, error = %produced.error, "demo_produce_response");

    // Consume a message
    let consumed = client.consume().await.context("Consume call failed")?;
    info!(
        payload = %String::from_utf8_lossy(consumed.payload.as_bytes()),
        error = %consumed.error,
        "demo_consume_response"
    );

    Ok(())
}
