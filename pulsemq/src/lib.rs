//! PulseMQ - Low-latency single-topic message queue.
//!
//! This library provides the shared modules for the three PulseMQ binaries:
//! - `pulsemq-server`: RPC server owning the in-memory queue
//! - `pulsemq-demo`: Produces one message and consumes one message
//! - `pulsemq-perf`: Concurrent produce throughput test
//!
//! ## Architecture
//!
//! ```text
//! Producers / Consumers → HTTP RPC (web) → QueueService → QueueStore (FIFO)
//! ```

pub mod client;
pub mod config;
pub mod queue;
pub mod service;
pub mod web;

// Re-export commonly used types
pub use client::{ClientError, QueueClient};
pub use config::Config;
pub use queue::{
    install_prometheus, BlockingConsumeRequest, ConsumeRequest, ConsumeResponse, Message,
    ProduceRequest, ProduceResponse, QueueError, QueueMetrics, QueueStats, QueueStore,
    QUEUE_EMPTY,
};
pub use service::QueueService;
pub use web::AppState;
