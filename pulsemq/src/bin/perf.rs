//! PulseMQ Perf - Concurrent produce throughput test.
//!
//! Runs `PERF_CONCURRENCY` workers, each keeping up to `PERF_INFLIGHT`
//! messages in flight, until `PERF_MESSAGES` have been sent or
//! `PERF_DURATION_SECS` elapses. Reports sent count, errors and throughput.
//!
//! `PERF_MODE` selects the transport:
//! - `rpc` (default): unary `/rpc/produce` calls over pooled HTTP connections
//! - `ws`: one `/ws/publish` connection per worker, frames pipelined
//! - `stream`: one `/ws/stream` connection per worker; every frame is an
//!   enqueue-then-dequeue exchange

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use futures::{stream, SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message as Frame};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pulsemq::config::{parse_var, server_url_from_env};
use pulsemq::{ConsumeResponse, Message, QueueClient, QUEUE_EMPTY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PerfMode {
    Rpc,
    Ws,
    Stream,
}

impl PerfMode {
    fn endpoint(self) -> Option<&'static str> {
        match self {
            PerfMode::Rpc => None,
            PerfMode::Ws => Some("ws/publish"),
            PerfMode::Stream => Some("ws/stream"),
        }
    }
}

impl FromStr for PerfMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rpc" => Ok(PerfMode::Rpc),
            "ws" => Ok(PerfMode::Ws),
            "stream" => Ok(PerfMode::Stream),
            other => bail!("unknown PERF_MODE {other:?} (expected rpc, ws or stream)"),
        }
    }
}

/// Default payload: `{"k":"v"}`
const DEFAULT_PAYLOAD_BASE64: &str = "eyJrIjoidiJ9";

#[derive(Debug, Clone)]
struct PerfConfig {
    mode: PerfMode,
    concurrency: usize,
    inflight: usize,
    messages: u64,
    duration: Duration,
    payload: Message,
}

impl PerfConfig {
    fn from_env() -> Result<Self> {
        let encoded =
            std::env::var("PERF_PAYLOAD").unwrap_or_else(|_| DEFAULT_PAYLOAD_BASE64.to_string());
        let payload = general_purpose::STANDARD
            .decode(encoded.trim())
            .context("PERF_PAYLOAD is not valid base64")?;

        let mode = match std::env::var("PERF_MODE") {
            Ok(value) => value.parse()?,
            Err(_) => PerfMode::Rpc,
        };

        Ok(Self {
            mode,
            concurrency: parse_var::<usize>("PERF_CONCURRENCY").filter(|&n| n > 0).unwrap_or(64),
            inflight: parse_var::<usize>("PERF_INFLIGHT").filter(|&n| n > 0).unwrap_or(8),
            messages: parse_var("PERF_MESSAGES").unwrap_or(100_000),
            duration: Duration::from_secs(parse_var("PERF_DURATION_SECS").unwrap_or(30)),
            payload: Message::from(payload),
        })
    }
}

#[derive(Debug, Default)]
struct Counters {
    /// Slots claimed by workers; may exceed the target by one per worker
    claimed: AtomicU64,
    sent: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    /// Claim one message slot; false once `target` slots are taken.
    fn claim(&self, target: u64) -> bool {
        self.claimed.fetch_add(1, Ordering::Relaxed) < target
    }

    fn record_sent(&self) {
        let sent = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        if sent % 50_000 == 0 {
            info!(sent, "perf_progress");
        }
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    let server_url = server_url_from_env();
    let config = PerfConfig::from_env()?;
    let client = QueueClient::new(&server_url).context("Failed to create client")?;

    info!(
        server_url = %server_url,
        mode = ?config.mode,
        concurrency = config.concurrency,
        inflight = config.inflight,
        messages = config.messages,
        duration_secs = config.duration.as_secs(),
        payload_length = config.payload.len(),
        "perf_starting"
    );

    let counters = Arc::new(Counters::default());
    let deadline = tokio::time::Instant::now() + config.duration;
    let started = Instant::now();

    let workers: Vec<_> = (0..config.concurrency)
        .map(|_| {
            let client = client.clone();
            let counters = Arc::clone(&counters);
            let config = config.clone();
            tokio::spawn(async move {
                let run = async move {
                    match config.mode.endpoint() {
                        None => run_rpc_worker(client, Arc::clone(&counters), config).await,
                        Some(endpoint) => {
                            let result =
                                run_ws_worker(&client, endpoint, &counters, &config).await;
                            if let Err(e) = result {
                                counters.record_error();
                                warn!(error = %e, "perf_ws_worker_failed");
                            }
                        }
                    }
                };
                // Hitting the deadline simply ends the worker
                let _ = tokio::time::timeout_at(deadline, run).await;
            })
        })
        .collect();

    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "perf_worker_panicked");
        }
    }

    let elapsed = started.elapsed();
    let sent = counters.sent.load(Ordering::Relaxed);
    let errors = counters.errors.load(Ordering::Relaxed);
    let throughput = sent as f64 / elapsed.as_secs_f64().max(f64::EPSILON);

    info!(
        sent,
        errors,
        elapsed_ms = elapsed.as_millis() as u64,
        throughput_per_sec = throughput.round() as u64,
        "perf_complete"
    );

    Ok(())
}

/// Issue produce calls with at most `inflight` outstanding until the target
/// count is claimed.
async fn run_rpc_worker(client: QueueClient, counters: Arc<Counters>, config: PerfConfig) {
    let target = config.messages;

    let claims = Arc::clone(&counters);
    let slots = stream::iter(std::iter::from_fn(move || claims.claim(target).then_some(())));

    slots
        .map(|()| {
            let client = client.clone();
            let payload = config.payload.clone();
            async move { client.produce(payload).await }
        })
        .buffer_unordered(config.inflight)
        .for_each(|result| {
            match result {
                Ok(response) if response.success => counters.record_sent(),
                Ok(response) => {
                    counters.record_error();
                    warn!(error = %response.error, "perf_produce_rejected");
                }
                Err(e) => {
                    counters.record_error();
                    warn!(error = %e, "perf_request_failed");
                }
            }
            futures::future::ready(())
        })
        .await;
}

/// Send frames over one WebSocket connection, keeping at most `inflight`
/// replies outstanding. Replies arrive in frame order.
async fn run_ws_worker(
    client: &QueueClient,
    endpoint: &str,
    counters: &Counters,
    config: &PerfConfig,
) -> Result<()> {
    let url = client.websocket_url(endpoint)?;
    let (socket, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    let (mut frames, mut replies) = socket.split();

    let mut outstanding = 0usize;
    let mut claiming = true;

    loop {
        if claiming && outstanding < config.inflight {
            if counters.claim(config.messages) {
                let frame = Frame::Binary(config.payload.as_bytes().to_vec());
                frames.send(frame).await.context("Failed to send frame")?;
                outstanding += 1;
                continue;
            }
            claiming = false;
        }

        if outstanding == 0 {
            break;
        }

        let reply = replies
            .next()
            .await
            .ok_or_else(|| anyhow!("connection closed with {outstanding} replies pending"))?
            .context("Failed to read reply")?;
        outstanding -= 1;

        if reply_succeeded(config.mode, &reply) {
            counters.record_sent();
        } else {
            counters.record_error();
            warn!(reply = ?reply, "perf_frame_rejected");
        }
    }

    // Best effort; the server ends the connection on close either way
    let _ = frames.close().await;
    Ok(())
}

/// Whether a reply frame acknowledges the enqueue.
fn reply_succeeded(mode: PerfMode, reply: &Frame) -> bool {
    let Frame::Text(text) = reply else {
        return false;
    };

    match mode {
        PerfMode::Ws => text == "ok",
        // An exchange that delivered nothing still enqueued, unless it
        // reports why the enqueue failed
        PerfMode::Stream => serde_json::from_str::<ConsumeResponse>(text)
            .map(|response| response.is_delivered() || response.error == QUEUE_EMPTY)
            .unwrap_or(false),
        PerfMode::Rpc => false,
    }
}
