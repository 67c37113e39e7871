//! Router configuration

use std::time::Duration;

/// Tunable timeouts for a [`Router`](crate::Router)
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Default deadline for [`request`](crate::Router::request) calls
    pub request_timeout: Duration,
    /// Deadline for [`wait_for_connection_to`](crate::Router::wait_for_connection_to)
    pub connect_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(1000),
            connect_timeout: Duration::from_millis(1000),
        }
    }
}

impl RouterConfig {
    /// Create a configuration with the default timeouts
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default request deadline
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the connection-wait deadline
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let config = RouterConfig::default();
        assert_eq!(config.request_timeout, Duration::from_millis(1000));
        assert_eq!(config.connect_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_builder_setters() {
        let config = RouterConfig::new()
            .with_request_timeout(Duration::from_secs(5))
            .with_connect_timeout(Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
    }
}
