//! Configuration module for environment variable parsing.
//!
//! All settings are read once at startup; unset or invalid values fall back
//! to defaults.

use std::env;
use std::time::Duration;

use tracing::warn;

/// Default port, matching the conventional RPC port the demo clients target.
pub const DEFAULT_PORT: u16 = 50051;

/// Default server URL used by the client binaries.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:50051";

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the listener to
    pub bind_addr: String,

    /// Port for the RPC server to listen on
    pub port: u16,

    /// Optional bound on queue length (None = unbounded)
    pub max_queue_len: Option<usize>,

    /// Largest accepted request body in bytes
    pub max_payload_bytes: usize,

    /// Upper limit for blocking consume waits
    pub max_blocking_consume: Duration,

    /// Period for throughput sampling
    pub stats_sample_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_queue_len: None,
            max_payload_bytes: 1024 * 1024,
            max_blocking_consume: Duration::from_secs(30),
            stats_sample_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),

            port: parse_var("PORT").unwrap_or(defaults.port),

            // Zero means "no bound"
            max_queue_len: parse_var::<usize>("MAX_QUEUE_LEN").filter(|&n| n > 0),

            max_payload_bytes: parse_var("MAX_PAYLOAD_BYTES")
                .unwrap_or(defaults.max_payload_bytes),

            max_blocking_consume: parse_var("MAX_BLOCKING_CONSUME_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_blocking_consume),

            stats_sample_interval: parse_var("STATS_SAMPLE_MS")
                .filter(|&ms: &u64| ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.stats_sample_interval),
        }
    }

    /// `host:port` the server listens on.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Server URL for client binaries, from `PULSEMQ_URL`.
pub fn server_url_from_env() -> String {
    env::var("PULSEMQ_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string())
}

/// Parse an environment variable, warning when it is set but unparsable.
pub fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;

    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(env_var = name, value = %raw, "invalid_env_value_using_default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_valid() {
        env::set_var("PULSEMQ_TEST_PARSE_VALID", " 8081 ");
        let result: Option<u16> = parse_var("PULSEMQ_TEST_PARSE_VALID");
        assert_eq!(result, Some(8081));
        env::remove_var("PULSEMQ_TEST_PARSE_VALID");
    }

    #[test]
    fn test_parse_var_invalid() {
        env::set_var("PULSEMQ_TEST_PARSE_INVALID", "not-a-port");
        let result: Option<u16> = parse_var("PULSEMQ_TEST_PARSE_INVALID");
        assert_eq!(result, None);
        env::remove_var("PULSEMQ_TEST_PARSE_INVALID");
    }

    #[test]
    fn test_parse_var_missing() {
        let result: Option<u16> = parse_var("PULSEMQ_TEST_NONEXISTENT_VAR");
        assert_eq!(result, None);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 50051);
        assert_eq!(config.max_queue_len, None);
        assert_eq!(config.listen_addr(), "0.0.0.0:50051");
    }
}
