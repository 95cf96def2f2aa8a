//! Configuration for the validation engine and the API transport.

use std::time::Duration;

/// Default number of simultaneous in-flight query tasks. Chosen to stay
/// comfortably under typical API rate limits.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default interval between batched task-status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default per-explore deadline for a query task to reach a terminal state.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(300);

/// Engine configuration shared by the validators.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum simultaneous outstanding query tasks.
    pub concurrency: usize,
    /// Interval between batched status polls.
    pub poll_interval: Duration,
    /// Deadline for each explore's query tasks to complete.
    pub query_timeout: Duration,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the modeling API instance, e.g. `https://bi.example.com`.
    pub base_url: String,
    /// API client ID.
    pub client_id: String,
    /// API client secret.
    pub client_secret: String,
    /// API port.
    pub port: u16,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            port: 19999,
            timeout_secs: 120,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// API root including port and version prefix.
    pub fn api_url(&self) -> String {
        format!("{}:{}/api/4.0", self.base_url, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_builder() {
        let config = EngineConfig::new()
            .with_concurrency(4)
            .with_poll_interval(Duration::from_millis(100))
            .with_query_timeout(Duration::from_secs(30));

        assert_eq!(config.concurrency, 4);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.query_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_concurrency_clamped_to_one() {
        let config = EngineConfig::new().with_concurrency(0);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn test_api_url_strips_trailing_slash() {
        let config = ApiConfig::new("https://bi.example.com/", "id", "secret");
        assert_eq!(config.api_url(), "https://bi.example.com:19999/api/4.0");
    }
}
