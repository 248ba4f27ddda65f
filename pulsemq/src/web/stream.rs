//! WebSocket endpoints for persistent producer and consumer connections.
//!
//! - `/ws/publish`: every data frame is produced; the reply is `ok` or
//!   `error: <reason>`
//! - `/ws/consume`: every inbound frame requests the next message; the reply
//!   is the binary payload or `error: queue empty`
//! - `/ws/stream`: every binary frame is enqueued and one message dequeued in
//!   the same step; a text frame only dequeues. Replies are JSON
//!   `ConsumeResponse` text frames.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use tracing::{debug, info, warn};

use super::AppState;
use crate::queue::{ConsumeRequest, Message, ProduceRequest};
use crate::service::QueueService;

pub async fn ws_publish(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    limit_frames(ws, &state).on_upgrade(move |socket| {
        serve_frames(socket, "publish", move |frame| {
            publish_reply(&state.service, frame)
        })
    })
}

pub async fn ws_consume(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    limit_frames(ws, &state).on_upgrade(move |socket| {
        serve_frames(socket, "consume", move |frame| {
            consume_reply(&state.service, frame)
        })
    })
}

pub async fn ws_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    limit_frames(ws, &state).on_upgrade(move |socket| {
        serve_frames(socket, "stream", move |frame| {
            stream_reply(&state.service, frame)
        })
    })
}

/// Apply the payload size limit to inbound frames and messages.
///
/// A peer that exceeds it gets a read error, which ends the connection before
/// anything is enqueued.
fn limit_frames(ws: WebSocketUpgrade, state: &AppState) -> WebSocketUpgrade {
    let limit = state.config.max_payload_bytes;
    ws.max_message_size(limit).max_frame_size(limit)
}

/// Read frames until the peer closes, answering each through `reply`.
async fn serve_frames<F>(mut socket: WebSocket, endpoint: &'static str, mut reply: F)
where
    F: FnMut(WsMessage) -> Option<WsMessage>,
{
    info!(endpoint, "ws_connection_opened");
    let mut frames: u64 = 0;

    while let Some(frame) = socket.recv().await {
        let frame = match frame {
            Ok(WsMessage::Close(_)) => break,
            Ok(frame) => frame,
            Err(e) => {
                warn!(endpoint, error = %e, "ws_read_error");
                break;
            }
        };

        let Some(response) = reply(frame) else {
            continue;
        };
        frames += 1;

        if let Err(e) = socket.send(response).await {
            warn!(endpoint, error = %e, "ws_write_error");
            break;
        }
    }

    info!(endpoint, frames, "ws_connection_closed");
}

/// Payload carried by a data frame. Control frames carry none.
fn frame_payload(frame: WsMessage) -> Option<Message> {
    match frame {
        WsMessage::Binary(data) => Some(Message::new(data)),
        WsMessage::Text(text) => Some(Message::new(text)),
        _ => None,
    }
}

fn publish_reply(service: &QueueService, frame: WsMessage) -> Option<WsMessage> {
    let payload = frame_payload(frame)?;
    let response = service.produce(ProduceRequest { payload });

    let text = if response.success {
        "ok".to_string()
    } else {
        format!("error: {}", response.error)
    };
    Some(WsMessage::Text(text))
}

fn consume_reply(service: &QueueService, frame: WsMessage) -> Option<WsMessage> {
    // Any data frame is a request for the next message
    frame_payload(frame)?;
    let response = service.consume(ConsumeRequest::default());

    if response.is_delivered() {
        Some(WsMessage::Binary(response.payload.into_bytes().into()))
    } else {
        Some(WsMessage::Text(format!("error: {}", response.error)))
    }
}

fn stream_reply(service: &QueueService, frame: WsMessage) -> Option<WsMessage> {
    let inbound = match frame {
        WsMessage::Binary(data) => Some(Message::new(data)),
        WsMessage::Text(_) => None,
        _ => return None,
    };

    let response = service.exchange(inbound);
    match serde_json::to_string(&response) {
        Ok(json) => Some(WsMessage::Text(json)),
        Err(e) => {
            debug!(error = %e, "ws_stream_encode_failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ConsumeResponse, QueueMetrics, QueueStore, QUEUE_EMPTY};
    use std::sync::Arc;

    fn service(max_len: Option<usize>) -> QueueService {
        QueueService::new(
            Arc::new(QueueStore::new(max_len)),
            Arc::new(QueueMetrics::new()),
        )
    }

    fn text(frame: Option<WsMessage>) -> String {
        match frame {
            Some(WsMessage::Text(text)) => text,
            other => panic!("Expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_publish_acknowledges_each_frame() {
        let service = service(None);

        let reply = publish_reply(&service, WsMessage::Binary(b"bin".to_vec()));
        assert_eq!(text(reply), "ok");
        let reply = publish_reply(&service, WsMessage::Text("txt".to_string()));
        assert_eq!(text(reply), "ok");

        assert_eq!(service.len(), 2);
    }

    #[test]
    fn test_publish_reports_full_queue() {
        let service = service(Some(1));

        publish_reply(&service, WsMessage::Binary(b"a".to_vec()));
        let reply = publish_reply(&service, WsMessage::Binary(b"b".to_vec()));
        assert_eq!(text(reply), "error: queue is full (max length: 1)");
    }

    #[test]
    fn test_control_frames_get_no_reply() {
        let service = service(None);

        assert!(publish_reply(&service, WsMessage::Ping(vec![1])).is_none());
        assert!(consume_reply(&service, WsMessage::Pong(vec![1])).is_none());
        assert!(stream_reply(&service, WsMessage::Ping(vec![])).is_none());
        assert!(service.is_empty());
    }

    #[test]
    fn test_consume_returns_binary_payload_then_error() {
        let service = service(None);
        service.produce(ProduceRequest::new(vec![0u8, 1, 2]));

        match consume_reply(&service, WsMessage::Text("next".to_string())) {
            Some(WsMessage::Binary(data)) => assert_eq!(data, vec![0u8, 1, 2]),
            other => panic!("Expected binary frame, got {other:?}"),
        }

        let reply = consume_reply(&service, WsMessage::Text("next".to_string()));
        assert_eq!(text(reply), format!("error: {QUEUE_EMPTY}"));
    }

    #[test]
    fn test_stream_exchanges_in_fifo_order() {
        let service = service(None);

        let first: ConsumeResponse =
            serde_json::from_str(&text(stream_reply(&service, WsMessage::Binary(b"one".to_vec()))))
                .unwrap();
        assert_eq!(first.payload, Message::from("one"));

        // Text frame only dequeues
        let empty: ConsumeResponse =
            serde_json::from_str(&text(stream_reply(&service, WsMessage::Text(String::new()))))
                .unwrap();
        assert_eq!(empty.error, QUEUE_EMPTY);
    }
}
