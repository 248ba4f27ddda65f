//! End-to-end tests: real router on a loopback port, driven through `QueueClient`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::StatusCode;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message as Frame};

use pulsemq::{
    install_prometheus, web, AppState, Config, Message, QueueClient, QueueMetrics, QueueService,
    QueueStore, QUEUE_EMPTY,
};

/// Start a server with `config` and return its base URL.
///
/// All servers in this binary share the process-wide Prometheus recorder.
async fn spawn_server(config: Config) -> String {
    let store = Arc::new(QueueStore::new(config.max_queue_len));
    let service = QueueService::new(store, Arc::new(QueueMetrics::new()));
    let prometheus = install_prometheus().unwrap();
    let app = web::router(AppState::new(config, service, prometheus));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

async fn client_for(config: Config) -> QueueClient {
    let url = spawn_server(config).await;
    QueueClient::new(&url).unwrap()
}

#[tokio::test]
async fn test_health() {
    let client = client_for(Config::default()).await;
    assert!(client.health().await.unwrap());
}

#[tokio::test]
async fn test_produce_a_b_then_consume_until_empty() {
    let client = client_for(Config::default()).await;

    assert!(client.produce("A").await.unwrap().success);
    assert!(client.produce("B").await.unwrap().success);

    let first = client.consume().await.unwrap();
    assert_eq!(first.payload, Message::from("A"));
    assert_eq!(first.error, "");

    let second = client.consume().await.unwrap();
    assert_eq!(second.payload, Message::from("B"));

    let third = client.consume().await.unwrap();
    assert_eq!(third.error, QUEUE_EMPTY);
    assert!(third.payload.is_empty());
}

#[tokio::test]
async fn test_consume_on_empty_queue_is_deterministic() {
    let client = client_for(Config::default()).await;

    for _ in 0..3 {
        let response = client.consume().await.unwrap();
        assert_eq!(response.error, QUEUE_EMPTY);
        assert!(response.payload.is_empty());
    }
}

#[tokio::test]
async fn test_binary_payload_round_trip() {
    let client = client_for(Config::default()).await;
    let payload: Vec<u8> = (0u8..=255).rev().collect();

    let produced = client.produce(payload.clone()).await.unwrap();
    assert!(produced.success);
    assert_eq!(produced.error, "");

    let consumed = client.consume().await.unwrap();
    assert_eq!(consumed.payload.as_bytes(), payload.as_slice());
}

#[tokio::test]
async fn test_zero_length_payload_round_trip() {
    let client = client_for(Config::default()).await;

    assert!(client.produce(Vec::<u8>::new()).await.unwrap().success);

    let consumed = client.consume().await.unwrap();
    assert!(consumed.is_delivered());
    assert!(consumed.payload.is_empty());
}

#[tokio::test]
async fn test_concurrent_producers_lose_and_duplicate_nothing() {
    let client = client_for(Config::default()).await;
    let producers = 50;

    let tasks: Vec<_> = (0..producers)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.produce(format!("p{i}").into_bytes()).await })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().unwrap().success);
    }

    let mut seen = HashSet::new();
    loop {
        let response = client.consume().await.unwrap();
        if !response.is_delivered() {
            break;
        }
        let text = String::from_utf8(response.payload.as_bytes().to_vec()).unwrap();
        assert!(seen.insert(text));
    }

    let expected: HashSet<String> = (0..producers).map(|i| format!("p{i}")).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_bounded_queue_rejects_in_response_body() {
    let config = Config {
        max_queue_len: Some(1),
        ..Config::default()
    };
    let client = client_for(config).await;

    assert!(client.produce("kept").await.unwrap().success);

    let rejected = client.produce("dropped").await.unwrap();
    assert!(!rejected.success);
    assert_eq!(rejected.error, "queue is full (max length: 1)");

    assert_eq!(client.consume().await.unwrap().payload, Message::from("kept"));
}

#[tokio::test]
async fn test_blocking_consume_waits_for_producer() {
    let client = client_for(Config::default()).await;

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.consume_blocking(Duration::from_secs(5)).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.produce("eventually").await.unwrap().success);

    let response = waiter.await.unwrap().unwrap();
    assert_eq!(response.payload, Message::from("eventually"));
}

#[tokio::test]
async fn test_blocking_consume_is_capped_by_server() {
    let config = Config {
        max_blocking_consume: Duration::from_millis(50),
        ..Config::default()
    };
    let client = client_for(config).await;

    let started = std::time::Instant::now();
    let response = client.consume_blocking(Duration::from_secs(10)).await.unwrap();

    assert_eq!(response.error, QUEUE_EMPTY);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_stats_reflect_activity() {
    let client = client_for(Config::default()).await;

    client.produce("one").await.unwrap();
    client.produce("two").await.unwrap();
    client.consume().await.unwrap();
    client.consume().await.unwrap();
    client.consume().await.unwrap();

    let stats = client.stats().await.unwrap();
    assert_eq!(stats.enqueued_total, 2);
    assert_eq!(stats.dequeued_total, 2);
    assert_eq!(stats.empty_polls_total, 1);
    assert_eq!(stats.queue_depth, 0);
}

#[tokio::test]
async fn test_malformed_request_is_a_transport_error() {
    let url = spawn_server(Config::default()).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{url}/rpc/produce"))
        .header("content-type", "application/json")
        .body(r#"{"payload": 42}"#)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());

    // The queue was not touched
    let client = QueueClient::new(&url).unwrap();
    assert_eq!(client.consume().await.unwrap().error, QUEUE_EMPTY);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let config = Config {
        max_payload_bytes: 64,
        ..Config::default()
    };
    let url = spawn_server(config).await;
    let client = QueueClient::new(&url).unwrap();

    let err = client.produce(vec![7u8; 1024]).await.unwrap_err();
    match err {
        pulsemq::ClientError::Http(e) => {
            assert_eq!(e.status(), Some(StatusCode::PAYLOAD_TOO_LARGE));
        }
        other => panic!("Expected HTTP error, got {other:?}"),
    }

    assert!(client.produce(vec![7u8; 8]).await.unwrap().success);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let url = spawn_server(Config::default()).await;
    let client = QueueClient::new(&url).unwrap();

    assert!(client.produce("scraped").await.unwrap().success);
    assert!(client.consume().await.unwrap().is_delivered());

    let response = reqwest::get(format!("{url}/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await.unwrap();
    for name in [
        "pulsemq_enqueued_total",
        "pulsemq_dequeued_total",
        "pulsemq_queue_depth",
        "pulsemq_enqueue_latency_seconds_bucket",
    ] {
        assert!(body.contains(name), "missing {name} in:\n{body}");
    }
}

#[tokio::test]
async fn test_websocket_publish_acknowledges_frames() {
    let url = spawn_server(Config::default()).await;
    let client = QueueClient::new(&url).unwrap();

    let ws_url = client.websocket_url("ws/publish").unwrap();
    let (mut socket, _) = connect_async(ws_url.as_str()).await.unwrap();

    socket.send(Frame::Binary(vec![1, 2, 3])).await.unwrap();
    let reply = socket.next().await.unwrap().unwrap();
    assert_eq!(reply, Frame::Text("ok".to_string()));
    let _ = socket.close(None).await;

    let consumed = client.consume().await.unwrap();
    assert_eq!(consumed.payload.as_bytes(), &[1, 2, 3]);
}

#[tokio::test]
async fn test_websocket_frame_over_payload_limit_is_refused() {
    let config = Config {
        max_payload_bytes: 64,
        ..Config::default()
    };
    let url = spawn_server(config).await;
    let client = QueueClient::new(&url).unwrap();

    for endpoint in ["ws/publish", "ws/stream"] {
        let ws_url = client.websocket_url(endpoint).unwrap();
        let (mut socket, _) = connect_async(ws_url.as_str()).await.unwrap();

        // A failed send means the server already dropped the connection
        let oversized = socket.send(Frame::Binary(vec![7u8; 1024 * 1024]));
        let _ = tokio::time::timeout(Duration::from_secs(5), oversized).await;

        // The server ends the connection instead of acknowledging
        let reply = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap();
        match reply {
            None | Some(Err(_)) | Some(Ok(Frame::Close(_))) => {}
            Some(Ok(other)) => panic!("{endpoint}: expected the connection to end, got {other:?}"),
        }
    }

    assert_eq!(client.consume().await.unwrap().error, QUEUE_EMPTY);
    assert_eq!(client.stats().await.unwrap().enqueued_total, 0);

    // Frames within the limit are still served
    let ws_url = client.websocket_url("ws/publish").unwrap();
    let (mut socket, _) = connect_async(ws_url.as_str()).await.unwrap();
    socket.send(Frame::Binary(vec![7u8; 64])).await.unwrap();
    assert_eq!(
        socket.next().await.unwrap().unwrap(),
        Frame::Text("ok".to_string())
    );
}
