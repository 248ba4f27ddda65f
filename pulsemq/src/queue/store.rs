//! In-memory FIFO store backing the queue service.
//!
//! All mutation happens inside one critical section, so the order observed by
//! consumers is the order in which producers acquired the lock.

use std::collections::{TryReserveError, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use super::types::Message;

/// Failure to append a message.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The configured length bound has been reached.
    #[error("queue is full (max length: {max_len})")]
    Full { max_len: usize },

    /// The queue buffer could not grow.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(#[from] TryReserveError),
}

/// Single-topic FIFO queue of opaque payloads.
///
/// The store only grows at the tail and only shrinks at the head.
#[derive(Debug)]
pub struct QueueStore {
    messages: Mutex<VecDeque<Message>>,
    max_len: Option<usize>,
    arrivals: Notify,
}

impl QueueStore {
    /// Create a store with an optional length bound.
    pub fn new(max_len: Option<usize>) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            max_len,
            arrivals: Notify::new(),
        }
    }

    /// Create a store without a length bound.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Append a message at the tail and return the queue length after the
    /// append.
    pub fn enqueue(&self, message: Message) -> Result<usize, QueueError> {
        let len = {
            let mut messages = self.messages.lock();

            if let Some(max_len) = self.max_len {
                if messages.len() >= max_len {
                    return Err(QueueError::Full { max_len });
                }
            }

            // Report allocation failure instead of aborting the process.
            messages.try_reserve(1)?;
            messages.push_back(message);
            messages.len()
        };

        self.arrivals.notify_one();
        Ok(len)
    }

    /// Remove the head message, or return `None` if the queue is empty.
    ///
    /// The message comes back with the queue length left behind, read under
    /// the same lock. Never waits.
    pub fn dequeue(&self) -> Option<(Message, usize)> {
        let mut messages = self.messages.lock();
        let message = messages.pop_front()?;
        Some((message, messages.len()))
    }

    /// Remove and return the head message, waiting up to `wait` for one to
    /// arrive.
    ///
    /// Dropping the returned future before it resolves leaves the queue
    /// untouched.
    pub async fn dequeue_timeout(&self, wait: Duration) -> Option<(Message, usize)> {
        let deadline = Instant::now() + wait;

        loop {
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            // Register before checking so an enqueue between the check and
            // the await still wakes us.
            notified.as_mut().enable();

            if let Some(head) = self.dequeue() {
                return Some(head);
            }

            if timeout_at(deadline, notified).await.is_err() {
                return self.dequeue();
            }
        }
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// True when no message is queued.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Configured length bound, `None` when unbounded.
    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::unbounded()
    }
}
