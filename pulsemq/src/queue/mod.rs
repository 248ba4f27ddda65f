//! Queue module: storage, message types and activity metrics.
//!
//! This module provides:
//! - `QueueStore`: the single-topic FIFO buffer
//! - Message and RPC wire types shared by the server and client
//! - `QueueMetrics`: lock-free counters for monitoring, mirrored to Prometheus

pub mod metrics;
pub mod store;
pub mod types;

pub use self::metrics::{install_prometheus, QueueMetrics, QueueStats};
pub use store::{QueueError, QueueStore};
pub use types::{
    BlockingConsumeRequest, ConsumeRequest, ConsumeResponse, Message, ProduceRequest,
    ProduceResponse, QUEUE_EMPTY,
};
