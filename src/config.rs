use std::fmt;
use std::time::Duration;
use url::Url;

/// Configuration for the matchmaking client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Where to connect and how to authenticate
    pub endpoint: EndpointConfig,
    /// Reconnection schedule
    pub backoff: BackoffConfig,
    /// Business-level heartbeat settings
    pub heartbeat: HeartbeatConfig,
    /// Cooldown settings
    pub cooldown: CooldownConfig,
    /// Delay between `match_found` and the navigation handoff
    pub match_handoff_delay: Duration,
    /// Capacity of the internal event channel feeding the driver task
    pub event_channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            backoff: BackoffConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            cooldown: CooldownConfig::default(),
            match_handoff_delay: Duration::from_millis(3000),
            event_channel_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// Create a new builder for configuration
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for ClientConfig
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the matchmaking WebSocket URL (`ws://` or `wss://`)
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint.ws_url = url.into();
        self
    }

    /// Set the REST API base URL
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint.api_base_url = url.into();
        self
    }

    /// Set the bearer credential used for both the transport and REST calls
    pub fn credential(mut self, token: impl Into<String>) -> Self {
        self.config.endpoint.credential = Some(Credential::new(token));
        self
    }

    /// Set endpoint configuration
    pub fn endpoint(mut self, config: EndpointConfig) -> Self {
        self.config.endpoint = config;
        self
    }

    /// Set backoff configuration
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.config.backoff = config;
        self
    }

    /// Set heartbeat configuration
    pub fn heartbeat(mut self, config: HeartbeatConfig) -> Self {
        self.config.heartbeat = config;
        self
    }

    /// Set cooldown configuration
    pub fn cooldown(mut self, config: CooldownConfig) -> Self {
        self.config.cooldown = config;
        self
    }

    /// Set the delay before handing off to the lobby after a match
    pub fn match_handoff_delay(mut self, delay: Duration) -> Self {
        self.config.match_handoff_delay = delay;
        self
    }

    /// Set the internal event channel capacity
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.event_channel_capacity = capacity;
        self
    }

    /// Build the configuration with validation.
    ///
    /// Returns an error for invalid configurations (e.g., an empty backoff schedule).
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let endpoint = &self.config.endpoint;
        let ws_url = Url::parse(&endpoint.ws_url)
            .map_err(|e| ConfigError::InvalidEndpoint(format!("ws_url: {}", e)))?;
        if !matches!(ws_url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidEndpoint(format!(
                "ws_url must use ws:// or wss://, got {}://",
                ws_url.scheme()
            )));
        }
        if ws_url.query_pairs().any(|(k, _)| k == "token") {
            return Err(ConfigError::InvalidEndpoint(
                "credentials must not be passed in the ws_url query".to_string(),
            ));
        }

        let api_url = Url::parse(&endpoint.api_base_url)
            .map_err(|e| ConfigError::InvalidEndpoint(format!("api_base_url: {}", e)))?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint(format!(
                "api_base_url must use http:// or https://, got {}://",
                api_url.scheme()
            )));
        }

        // Validate backoff config
        if self.config.backoff.schedule.is_empty() {
            return Err(ConfigError::InvalidBackoff(
                "schedule must contain at least one delay".to_string(),
            ));
        }

        if self.config.backoff.max_attempts == 0 {
            return Err(ConfigError::InvalidBackoff(
                "max_attempts must be > 0".to_string(),
            ));
        }

        // Validate heartbeat config
        if self.config.heartbeat.timeout.is_zero() {
            return Err(ConfigError::InvalidHeartbeat(
                "timeout must be > 0".to_string(),
            ));
        }

        if self.config.cooldown.error_prefix.is_empty() {
            return Err(ConfigError::InvalidCooldown(
                "error_prefix cannot be empty".to_string(),
            ));
        }

        if self.config.cooldown.tick_interval.is_zero() {
            return Err(ConfigError::InvalidCooldown(
                "tick_interval must be > 0".to_string(),
            ));
        }

        if self.config.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidChannel(
                "event_channel_capacity cannot be 0".to_string(),
            ));
        }

        Ok(self.config)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid endpoint URL
    #[error("Invalid endpoint configuration: {0}")]
    InvalidEndpoint(String),
    /// Invalid backoff configuration
    #[error("Invalid backoff configuration: {0}")]
    InvalidBackoff(String),
    /// Invalid heartbeat configuration
    #[error("Invalid heartbeat configuration: {0}")]
    InvalidHeartbeat(String),
    /// Invalid cooldown configuration
    #[error("Invalid cooldown configuration: {0}")]
    InvalidCooldown(String),
    /// Invalid channel sizing
    #[error("Invalid channel configuration: {0}")]
    InvalidChannel(String),
}

/// Bearer token sent on the transport upgrade and REST calls.
///
/// `Debug` output is redacted so configs can be logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Endpoint-related configuration
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Matchmaking WebSocket URL
    pub ws_url: String,
    /// Base URL for the REST collaborator
    pub api_base_url: String,
    /// Connection-level credential, never embedded in URLs
    pub credential: Option<Credential>,
    /// Timeout for establishing a transport connection
    pub connect_timeout: Duration,
    /// Timeout for individual REST requests
    pub request_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8080/ws/matchmaking".to_string(),
            api_base_url: "http://127.0.0.1:8080/api".to_string(),
            credential: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Backoff configuration for reconnection
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Ordered delays indexed by attempt number; the last one repeats
    pub schedule: Vec<Duration>,
    /// Reconnect attempts allowed per queuing episode before giving up
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            schedule: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            max_attempts: 3,
        }
    }
}

impl BackoffConfig {
    /// Calculate the delay for a given attempt number (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let last = self.schedule.len().saturating_sub(1);
        let index = (attempt as usize).min(last);
        self.schedule.get(index).copied().unwrap_or(Duration::ZERO)
    }

    /// Whether another reconnect may be scheduled after `attempts` failures
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Business heartbeat configuration
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Silence allowed while queuing before the transport is force-closed
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Cooldown configuration
#[derive(Debug, Clone)]
pub struct CooldownConfig {
    /// Prefix of server error codes carrying a cooldown, e.g. `QUEUE_COOLDOWN:45`
    pub error_prefix: String,
    /// Local countdown granularity
    pub tick_interval: Duration,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            error_prefix: "QUEUE_COOLDOWN".to_string(),
            tick_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_schedule() {
        let config = BackoffConfig::default();

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));

        // Past the schedule the last delay repeats
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(50), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_cap() {
        let config = BackoffConfig::default();
        assert!(config.allows(0));
        assert!(config.allows(2));
        assert!(!config.allows(3));
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::builder()
            .ws_url("wss://mm.example.com/ws")
            .api_base_url("https://api.example.com")
            .credential("secret")
            .match_handoff_delay(Duration::from_millis(500))
            .build()
            .expect("valid config");

        assert_eq!(config.endpoint.ws_url, "wss://mm.example.com/ws");
        assert_eq!(config.match_handoff_delay, Duration::from_millis(500));
        assert_eq!(config.heartbeat.timeout, Duration::from_secs(30)); // default
    }

    #[test]
    fn test_config_builder_rejects_empty_schedule() {
        let result = ClientConfig::builder()
            .backoff(BackoffConfig {
                schedule: vec![],
                max_attempts: 3,
            })
            .build();

        assert!(matches!(result, Err(ConfigError::InvalidBackoff(_))));
    }

    #[test]
    fn test_config_builder_rejects_http_ws_url() {
        let result = ClientConfig::builder().ws_url("http://mm.example.com").build();
        assert!(matches!(result, Err(ConfigError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_config_builder_rejects_token_in_query() {
        let result = ClientConfig::builder()
            .ws_url("wss://mm.example.com/ws?token=abc")
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let config = ClientConfig::builder()
            .credential("super-secret")
            .build()
            .expect("valid config");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("Credential(***)"));
    }
}
