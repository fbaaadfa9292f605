use std::time::Duration;
use url::Url;

/// Configuration for a [`SessionManager`](crate::SessionManager)
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint to connect to (`ws://` or `wss://`)
    pub target_url: String,
    /// Maximum automatic reconnection attempts before requiring a manual `connect()`
    pub max_reconnect_attempts: u32,
    /// Fixed cooldown between a drop and the next reconnection attempt
    pub reconnect_delay: Duration,
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
}

impl SessionConfig {
    /// Create a configuration with default reconnection settings
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(3000),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Create a new builder for configuration
    pub fn builder(target_url: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: Self::new(target_url),
        }
    }
}

/// Builder for SessionConfig
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set the maximum number of automatic reconnection attempts.
    ///
    /// `0` disables automatic reconnection entirely: every drop leaves the
    /// session `Disconnected` until `connect()` is called again.
    pub fn max_reconnect_attempts(mut self, max: u32) -> Self {
        self.config.max_reconnect_attempts = max;
        self
    }

    /// Set the fixed cooldown between reconnection attempts
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Set the connection establishment timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Build the configuration with validation.
    ///
    /// Returns an error for invalid configurations (e.g., a non-WebSocket
    /// URL or a zero connect timeout).
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        let url = Url::parse(&self.config.target_url)
            .map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

        match url.scheme() {
            "ws" | "wss" => {}
            scheme => {
                return Err(ConfigError::InvalidUrl(format!(
                    "scheme must be ws or wss, got {scheme}"
                )))
            }
        }

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl("URL has no host".to_string()));
        }

        if self.config.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connect_timeout cannot be 0".to_string(),
            ));
        }

        Ok(self.config)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid target URL
    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),
    /// Invalid timeout configuration
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new("ws://localhost:9000");

        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay, Duration::from_millis(3000));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::builder("wss://example.com/feed")
            .max_reconnect_attempts(2)
            .reconnect_delay(Duration::from_millis(100))
            .build()
            .expect("valid config");

        assert_eq!(config.target_url, "wss://example.com/feed");
        assert_eq!(config.max_reconnect_attempts, 2);
        assert_eq!(config.reconnect_delay, Duration::from_millis(100));
        assert_eq!(config.connect_timeout, Duration::from_secs(10)); // default
    }

    #[test]
    fn test_config_builder_rejects_non_websocket_scheme() {
        let result = SessionConfig::builder("http://example.com").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_builder_rejects_garbage_url() {
        let result = SessionConfig::builder("not a url").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_builder_rejects_zero_connect_timeout() {
        let result = SessionConfig::builder("ws://example.com")
            .connect_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_max_attempts_is_valid() {
        let config = SessionConfig::builder("ws://example.com")
            .max_reconnect_attempts(0)
            .build()
            .expect("valid config");
        assert_eq!(config.max_reconnect_attempts, 0);
    }
}
