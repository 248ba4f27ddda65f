//! RPC-facing queue service.
//!
//! `QueueService` turns produce and consume calls into `QueueStore`
//! operations and encodes every outcome, including an empty queue, as a
//! well-formed response message. It holds no per-call state; everything
//! lives in the injected store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::queue::{
    BlockingConsumeRequest, ConsumeRequest, ConsumeResponse, Message, ProduceRequest,
    ProduceResponse, QueueError, QueueMetrics, QueueStats, QueueStore,
};

#[derive(Debug, Clone)]
pub struct QueueService {
    store: Arc<QueueStore>,
    metrics: Arc<QueueMetrics>,
}

impl QueueService {
    pub fn new(store: Arc<QueueStore>, metrics: Arc<QueueMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Append the request payload to the queue.
    ///
    /// Zero-length payloads are accepted.
    pub fn produce(&self, request: ProduceRequest) -> ProduceResponse {
        match self.enqueue(request.payload) {
            Ok(()) => ProduceResponse::ok(),
            Err(e) => ProduceResponse::failed(e.to_string()),
        }
    }

    /// Remove the head message without waiting.
    ///
    /// An empty queue is reported in the response error, not as a fault.
    pub fn consume(&self, _request: ConsumeRequest) -> ConsumeResponse {
        self.deliver(self.store.dequeue())
    }

    /// Remove the head message, waiting up to `timeout_ms` (capped at
    /// `max_wait`) for one to arrive.
    pub async fn consume_blocking(
        &self,
        request: BlockingConsumeRequest,
        max_wait: Duration,
    ) -> ConsumeResponse {
        let wait = Duration::from_millis(request.timeout_ms).min(max_wait);
        if wait.is_zero() {
            return self.consume(ConsumeRequest::default());
        }

        debug!(wait_ms = wait.as_millis() as u64, "consume_blocking_waiting");
        let head = self.store.dequeue_timeout(wait).await;
        self.deliver(head)
    }

    /// One streaming step: enqueue the inbound payload if any, then dequeue.
    ///
    /// A failed enqueue does not prevent the dequeue; its reason is reported
    /// when nothing could be delivered.
    pub fn exchange(&self, inbound: Option<Message>) -> ConsumeResponse {
        let produce_error = inbound.and_then(|payload| self.enqueue(payload).err());

        let response = self.deliver(self.store.dequeue());
        match produce_error {
            Some(e) if !response.is_delivered() => ConsumeResponse::failed(e.to_string()),
            _ => response,
        }
    }

    /// Counter snapshot. Depth is read from the store, not from the last
    /// recorded value.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queue_depth: self.store.len() as u64,
            ..self.metrics.snapshot()
        }
    }

    /// Refresh throughput over `period` and resynchronise the depth gauge.
    ///
    /// Depth recorded per operation can be overtaken by a concurrent caller;
    /// the periodic resync bounds how long a stale value survives.
    pub fn sample(&self, period: Duration) {
        self.metrics.sample(period);
        self.metrics.record_depth(self.store.len());
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn enqueue(&self, payload: Message) -> Result<(), QueueError> {
        let started = Instant::now();
        let payload_length = payload.len();

        match self.store.enqueue(payload) {
            Ok(depth) => {
                self.metrics.record_enqueue(started.elapsed(), depth);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_rejected();
                warn!(error = %e, payload_length, "produce_rejected");
                Err(e)
            }
        }
    }

    fn deliver(&self, head: Option<(Message, usize)>) -> ConsumeResponse {
        match head {
            Some((message, depth)) => {
                self.metrics.record_dequeue(depth);
                ConsumeResponse::delivered(message)
            }
            None => {
                self.metrics.record_empty_poll();
                ConsumeResponse::empty()
            }
        }
    }
}
