//! HTTP client for the queue RPC endpoints.
//!
//! The client is cheap to clone and can be shared across tasks; it reuses
//! pooled connections. Queue outcomes (such as an empty queue) come back in
//! the response messages; only transport problems are errors.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use url::Url;

use crate::queue::{
    BlockingConsumeRequest, ConsumeRequest, ConsumeResponse, Message, ProduceRequest,
    ProduceResponse, QueueStats,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no websocket scheme for {0} urls")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone)]
pub struct QueueClient {
    http: Client,
    base_url: Url,
}

impl QueueClient {
    /// Create a client for the server at `base_url` (e.g. `http://localhost:50051`).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = Client::builder().pool_max_idle_per_host(100).build()?;
        Self::with_http_client(base_url, http)
    }

    /// Create a client that shares an existing `reqwest::Client`.
    ///
    /// A base URL with a path prefix (`http://host/mq`) keeps it: endpoints
    /// resolve beneath it.
    pub fn with_http_client(base_url: &str, http: Client) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// WebSocket URL of `path` on the same server (`http` → `ws`,
    /// `https` → `wss`).
    pub fn websocket_url(&self, path: &str) -> Result<Url, ClientError> {
        let scheme = match self.base_url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(ClientError::UnsupportedScheme(other.to_string())),
        };
        let mut url = self.base_url.join(path)?;
        url.set_scheme(scheme)
            .map_err(|()| ClientError::UnsupportedScheme(url.scheme().to_string()))?;
        Ok(url)
    }

    pub async fn produce(&self, payload: impl Into<Message>) -> Result<ProduceResponse, ClientError> {
        self.call("rpc/produce", &ProduceRequest::new(payload), None).await
    }

    pub async fn consume(&self) -> Result<ConsumeResponse, ClientError> {
        self.call("rpc/consume", &ConsumeRequest::default(), None).await
    }

    /// Consume, letting the server wait up to `timeout` for a message.
    pub async fn consume_blocking(&self, timeout: Duration) -> Result<ConsumeResponse, ClientError> {
        let request = BlockingConsumeRequest {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };
        // Leave headroom for the server-side wait
        let http_timeout = timeout.saturating_add(Duration::from_secs(5));
        self.call("rpc/consume_blocking", &request, Some(http_timeout)).await
    }

    pub async fn stats(&self) -> Result<QueueStats, ClientError> {
        let url = self.base_url.join("stats")?;
        let stats = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(stats)
    }

    /// True when the server answers its health check.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let url = self.base_url.join("health")?;
        let response = self.http.get(url).send().await?;
        Ok(response.status().is_success())
    }

    async fn call<Req, Resp>(
        &self,
        path: &str,
        request: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp, ClientError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        let mut builder = self.http.post(url).json(request);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?.error_for_status()?.json().await?;
        Ok(response)
    }
}
