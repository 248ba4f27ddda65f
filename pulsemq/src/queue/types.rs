//! Message and RPC wire types.
//!
//! Payloads are opaque bytes. On the JSON wire they travel as standard
//! base64 strings so that arbitrary binary data survives the round trip.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Error text returned by consume operations when no message is available.
pub const QUEUE_EMPTY: &str = "queue empty";

// =============================================================================
// Message
// =============================================================================

/// An immutable, opaque queue payload.
///
/// Cloning is cheap: the underlying buffer is reference counted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message(Bytes);

impl Message {
    /// Wrap any buffer convertible to `Bytes` without copying it.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self(payload.into())
    }

    /// Borrow the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwrap the payload buffer.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for Message {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Message {
    fn from(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }
}

impl From<&'static str> for Message {
    fn from(text: &'static str) -> Self {
        Self(Bytes::from_static(text.as_bytes()))
    }
}

/// Serde helper encoding a `Message` as a standard base64 string.
mod payload_base64 {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Message;

    pub fn serialize<S>(message: &Message, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        general_purpose::STANDARD
            .encode(message.as_bytes())
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Message, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        Ok(Message::new(decoded))
    }
}

// =============================================================================
// Produce
// =============================================================================

/// Request to append one message to the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceRequest {
    /// Payload to enqueue; a missing field means the empty payload
    #[serde(default, with = "payload_base64")]
    pub payload: Message,
}

impl ProduceRequest {
    pub fn new(payload: impl Into<Message>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

/// Outcome of a produce call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceResponse {
    pub success: bool,
    /// Empty on success
    #[serde(default)]
    pub error: String,
}

impl ProduceResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: String::new(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: reason.into(),
        }
    }
}

// =============================================================================
// Consume
// =============================================================================

/// Trigger for a non-blocking consume. Carries no fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeRequest {}

/// Trigger for a consume that waits for a message to arrive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingConsumeRequest {
    /// Maximum time to wait, in milliseconds. Zero behaves like a plain consume.
    #[serde(default)]
    pub timeout_ms: u64,
}

/// Outcome of a consume call.
///
/// A non-empty `error` means no message was delivered and `payload` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeResponse {
    #[serde(default, with = "payload_base64")]
    pub payload: Message,
    #[serde(default)]
    pub error: String,
}

impl ConsumeResponse {
    pub fn delivered(payload: Message) -> Self {
        Self {
            payload,
            error: String::new(),
        }
    }

    pub fn empty() -> Self {
        Self::failed(QUEUE_EMPTY)
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            payload: Message::default(),
            error: reason.into(),
        }
    }

    /// True when a message was delivered.
    pub fn is_delivered(&self) -> bool {
        self.error.is_empty()
    }
}
