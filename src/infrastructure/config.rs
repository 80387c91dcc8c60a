//! Configuration management for the feed client
//!
//! Loads configuration from config.toml at startup.
//! A feed client's settings are fixed once it is constructed; changing them
//! means building a new client.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Environment variable overriding `feed.url`
pub const FEED_URL_ENV: &str = "FEED_URL";

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Price feed connection settings
    #[serde(default)]
    pub feed: FeedConfig,

    /// Status API settings
    #[serde(default)]
    pub api: ApiConfig,
}

/// Price feed client configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeedConfig {
    /// WebSocket endpoint (ws:// or wss://)
    #[serde(default = "default_url")]
    pub url: String,

    /// Interval between liveness probes; also the probe response deadline
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,

    /// Retries allowed after consecutive failures before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any retry delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Handshake timeout, counted as a handshake failure
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Spread retry delays by ±20%
    #[serde(default)]
    pub jitter: bool,
}

/// Status API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Serve the status API
    #[serde(default)]
    pub enabled: bool,

    /// Port for HTTP API server
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            ping_interval_ms: default_ping_interval(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            connect_timeout_ms: default_connect_timeout(),
            jitter: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_api_port(),
        }
    }
}

fn default_url() -> String {
    "ws://localhost:8000/ws/market".to_string()
}

fn default_ping_interval() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    10_000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_api_port() -> u16 {
    5000
}

impl FeedConfig {
    /// Check every invariant the client relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.url)
            .map_err(|e| ConfigError::Invalid(format!("url {:?}: {}", self.url, e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::Invalid(format!(
                "url scheme must be ws or wss, got {}",
                url.scheme()
            )));
        }
        if self.ping_interval_ms == 0 {
            return Err(ConfigError::Invalid("ping_interval_ms must be > 0".to_string()));
        }
        if self.initial_backoff_ms == 0 {
            return Err(ConfigError::Invalid("initial_backoff_ms must be > 0".to_string()));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::Invalid(
                "max_backoff_ms must be >= initial_backoff_ms".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("connect_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }

    #[inline]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    #[inline]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    #[inline]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Config {
    /// Load configuration from config.toml file
    ///
    /// Path comes from `CONFIG_PATH` (default `config.toml`). If the file
    /// doesn't exist, returns default configuration. `FEED_URL` overrides
    /// the feed URL either way.
    /// # Errors
    /// Returns error if file exists but cannot be parsed, or the result
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(contents) => Self::from_toml(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File not found - use defaults
                Config::default()
            }
            Err(e) => return Err(ConfigError::IoError(e)),
        };

        if let Ok(url) = std::env::var(FEED_URL_ENV) {
            config.feed.url = url;
        }

        config.feed.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    /// Parse error (invalid TOML)
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    /// Values violate an invariant
    #[error("Invalid config: {0}")]
    Invalid(String),
}
