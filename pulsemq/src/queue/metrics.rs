//! Queue activity counters.
//!
//! Counters are plain atomics so recording never contends with the queue lock.
//! Throughput is derived by [`QueueMetrics::sample`], which the server calls
//! on a fixed period.
//!
//! Every recording is also forwarded to the `metrics` facade. Once
//! [`install_prometheus`] has run, those values are rendered in Prometheus
//! text format on `/metrics`; without a recorder the facade calls are no-ops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const ENQUEUED_TOTAL: &str = "pulsemq_enqueued_total";
const DEQUEUED_TOTAL: &str = "pulsemq_dequeued_total";
const REJECTED_TOTAL: &str = "pulsemq_rejected_total";
const EMPTY_POLLS_TOTAL: &str = "pulsemq_empty_polls_total";
const QUEUE_DEPTH: &str = "pulsemq_queue_depth";
const ENQUEUE_THROUGHPUT: &str = "pulsemq_enqueue_throughput";
const DEQUEUE_THROUGHPUT: &str = "pulsemq_dequeue_throughput";
const ENQUEUE_LATENCY_SECONDS: &str = "pulsemq_enqueue_latency_seconds";

/// Smallest enqueue latency bucket: 100µs.
const LATENCY_BUCKET_START: f64 = 0.000_1;
const LATENCY_BUCKET_COUNT: i32 = 16;

static PROMETHEUS: Mutex<Option<PrometheusHandle>> = parking_lot::const_mutex(None);

/// Install the process-wide Prometheus recorder and return its handle.
///
/// The recorder is installed once; later calls return the same handle.
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    let mut slot = PROMETHEUS.lock();
    if let Some(handle) = slot.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(ENQUEUE_LATENCY_SECONDS.to_string()),
            &latency_buckets(),
        )?
        .install_recorder()?;

    *slot = Some(handle.clone());
    Ok(handle)
}

/// Exponential buckets: 100µs doubling sixteen times (up to ~3.3s).
fn latency_buckets() -> Vec<f64> {
    (0..LATENCY_BUCKET_COUNT)
        .map(|n| LATENCY_BUCKET_START * 2f64.powi(n))
        .collect()
}

#[derive(Debug, Default)]
pub struct QueueMetrics {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    rejected: AtomicU64,
    empty_polls: AtomicU64,
    depth: AtomicU64,
    enqueue_latency_nanos: AtomicU64,

    // State for throughput sampling
    last_enqueued: AtomicU64,
    last_dequeued: AtomicU64,
    enqueue_rate: AtomicU64,
    dequeue_rate: AtomicU64,
}

/// Point-in-time view of the queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub enqueued_total: u64,
    pub dequeued_total: u64,
    pub rejected_total: u64,
    pub empty_polls_total: u64,
    pub queue_depth: u64,
    /// Messages enqueued per second over the last sampling period
    pub enqueue_throughput: u64,
    /// Messages dequeued per second over the last sampling period
    pub dequeue_throughput: u64,
    pub avg_enqueue_latency_us: f64,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful enqueue; `depth` is the queue length right after it.
    pub fn record_enqueue(&self, latency: Duration, depth: usize) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.enqueue_latency_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.record_depth(depth);

        counter!(ENQUEUED_TOTAL).increment(1);
        histogram!(ENQUEUE_LATENCY_SECONDS).record(latency.as_secs_f64());
    }

    /// Record a delivered message; `depth` is the queue length right after it.
    pub fn record_dequeue(&self, depth: usize) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        self.record_depth(depth);

        counter!(DEQUEUED_TOTAL).increment(1);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        counter!(REJECTED_TOTAL).increment(1);
    }

    pub fn record_empty_poll(&self) {
        self.empty_polls.fetch_add(1, Ordering::Relaxed);
        counter!(EMPTY_POLLS_TOTAL).increment(1);
    }

    pub fn record_depth(&self, depth: usize) {
        self.depth.store(depth as u64, Ordering::Relaxed);
        gauge!(QUEUE_DEPTH).set(depth as f64);
    }

    /// Update throughput from the counter deltas accumulated over `period`.
    pub fn sample(&self, period: Duration) {
        let enqueued = self.enqueued.load(Ordering::Relaxed);
        let dequeued = self.dequeued.load(Ordering::Relaxed);
        let prev_enqueued = self.last_enqueued.swap(enqueued, Ordering::Relaxed);
        let prev_dequeued = self.last_dequeued.swap(dequeued, Ordering::Relaxed);

        let enqueue_rate = per_second(enqueued.saturating_sub(prev_enqueued), period);
        let dequeue_rate = per_second(dequeued.saturating_sub(prev_dequeued), period);
        self.enqueue_rate.store(enqueue_rate, Ordering::Relaxed);
        self.dequeue_rate.store(dequeue_rate, Ordering::Relaxed);

        gauge!(ENQUEUE_THROUGHPUT).set(enqueue_rate as f64);
        gauge!(DEQUEUE_THROUGHPUT).set(dequeue_rate as f64);
    }

    pub fn snapshot(&self) -> QueueStats {
        let enqueued_total = self.enqueued.load(Ordering::Relaxed);
        let latency_nanos = self.enqueue_latency_nanos.load(Ordering::Relaxed);
        let avg_enqueue_latency_us = if enqueued_total == 0 {
            0.0
        } else {
            latency_nanos as f64 / enqueued_total as f64 / 1_000.0
        };

        QueueStats {
            enqueued_total,
            dequeued_total: self.dequeued.load(Ordering::Relaxed),
            rejected_total: self.rejected.load(Ordering::Relaxed),
            empty_polls_total: self.empty_polls.load(Ordering::Relaxed),
            queue_depth: self.depth.load(Ordering::Relaxed),
            enqueue_throughput: self.enqueue_rate.load(Ordering::Relaxed),
            dequeue_throughput: self.dequeue_rate.load(Ordering::Relaxed),
            avg_enqueue_latency_us,
        }
    }
}

fn per_second(count: u64, period: Duration) -> u64 {
    let millis = period.as_millis().max(1) as u64;
    count.saturating_mul(1_000) / millis
}
