//! Transport configuration.

use std::time::Duration;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default total request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default cap on requests in flight at once within a batch.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 16;

/// Default idle connections kept per host.
pub const DEFAULT_MAX_IDLE_PER_HOST: usize = 8;

/// Default number of redirects followed per request.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Lower bound of the idle wait between progress checks.
pub const MIN_IDLE_WAIT: Duration = Duration::from_millis(1);

/// Configuration for [`BatchTransport`](super::BatchTransport).
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    /// Bound on the whole request, including reading the body.
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
    pub max_idle_per_host: usize,
    pub max_redirects: usize,
    pub user_agent: String,
    /// Tokio worker threads driving network I/O. One is enough: the batch
    /// is multiplexed cooperatively on that thread.
    pub io_threads: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: format!("mediarepo/{}", env!("CARGO_PKG_VERSION")),
            io_threads: 1,
        }
    }
}

impl TransportConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// How long to sleep between checks on an in-flight batch.
    ///
    /// The smaller of the two timeouts, never below [`MIN_IDLE_WAIT`].
    pub fn idle_wait(&self) -> Duration {
        self.connect_timeout
            .min(self.request_timeout)
            .max(MIN_IDLE_WAIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout.as_secs(), DEFAULT_CONNECT_TIMEOUT_SECS);
        assert_eq!(config.request_timeout.as_secs(), DEFAULT_REQUEST_TIMEOUT_SECS);
        assert!(config.user_agent.starts_with("mediarepo/"));
    }

    #[test]
    fn test_idle_wait_uses_smaller_timeout() {
        let config = TransportConfig::default()
            .with_connect_timeout(Duration::from_secs(3))
            .with_request_timeout(Duration::from_secs(20));
        assert_eq!(config.idle_wait(), Duration::from_secs(3));
    }

    #[test]
    fn test_idle_wait_is_floored() {
        let config = TransportConfig::default()
            .with_connect_timeout(Duration::ZERO)
            .with_request_timeout(Duration::from_secs(20));
        assert_eq!(config.idle_wait(), MIN_IDLE_WAIT);
    }
}
