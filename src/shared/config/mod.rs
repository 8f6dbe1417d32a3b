//! Client configuration module
//!
//! Provides configuration for the store, the dispatcher and the realtime
//! channel. Values come from defaults, an optional TOML file, environment
//! variables (`XFBOARD_SERVER_URL`, `XFBOARD_BOARD_ID`), or the builder —
//! later sources win in that order.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default server URL
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";
/// Default board id used in the subscribe handshake
const DEFAULT_BOARD_ID: &str = "default";

/// Top-level client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the task-board server
    pub server_url: String,
    /// Board the client subscribes to
    pub board_id: String,
    /// Dispatcher tuning
    pub dispatch: DispatchConfig,
    /// Realtime-channel tuning
    pub realtime: RealtimeConfig,
    /// Store tuning
    pub store: StoreConfig,
}

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Window within which identical requests coalesce
    pub debounce_window: Duration,
    /// Per-attempt deadline
    pub request_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay
    pub backoff_base: Duration,
    /// Backoff growth factor
    pub backoff_multiplier: f64,
    /// Backoff ceiling
    pub backoff_cap: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(1000),
            request_timeout: Duration::from_millis(30_000),
            max_retries: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            backoff_cap: Duration::from_millis(10_000),
        }
    }
}

/// Realtime-channel tuning
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Keepalive interval; the timer resets on any inbound frame
    pub heartbeat_interval: Duration,
    /// First reconnect delay
    pub reconnect_base: Duration,
    /// Reconnect backoff growth factor
    pub reconnect_factor: f64,
    /// Reconnect delay ceiling
    pub reconnect_cap: Duration,
    /// Consecutive failures before the channel gives up
    pub max_reconnect_attempts: u32,
    /// Randomize reconnect delays to spread thundering herds
    pub reconnect_jitter: bool,
    /// Outbound messages retained while disconnected; oldest dropped beyond this
    pub outbound_queue_cap: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base: Duration::from_millis(1000),
            reconnect_factor: 2.0,
            reconnect_cap: Duration::from_millis(30_000),
            max_reconnect_attempts: 5,
            reconnect_jitter: true,
            outbound_queue_cap: 100,
        }
    }
}

/// Store tuning
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Snapshot ring-buffer capacity
    pub history_capacity: usize,
    /// Budget for the synchronous apply path; exceeding it logs a warning
    pub latency_budget: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            latency_budget: Duration::from_millis(200),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            board_id: DEFAULT_BOARD_ID.to_string(),
            dispatch: DispatchConfig::default(),
            realtime: RealtimeConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new ClientConfigBuilder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("XFBOARD_SERVER_URL") {
            config.server_url = url;
        }
        if let Ok(board) = std::env::var("XFBOARD_BOARD_ID") {
            config.board_id = board;
        }
        config
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        let file: ConfigFile =
            toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::from_env();
        file.merge_into(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Default config file location (`<config dir>/xfboard/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("xfboard").join("config.toml"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.is_empty() {
            return Err(ConfigError::MissingValue("server_url"));
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.server_url.clone()));
        }
        if self.store.history_capacity == 0 {
            return Err(ConfigError::MissingValue("store.history_capacity"));
        }
        Ok(())
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), path)
    }

    /// Push-channel URL derived from the server URL
    pub fn realtime_url(&self) -> String {
        let ws = self
            .server_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/ws", ws.trim_end_matches('/'))
    }
}

/// Builder for ClientConfig
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    server_url: Option<String>,
    board_id: Option<String>,
    dispatch: Option<DispatchConfig>,
    realtime: Option<RealtimeConfig>,
    store: Option<StoreConfig>,
}

impl ClientConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Set the board id
    pub fn board_id(mut self, board_id: impl Into<String>) -> Self {
        self.board_id = Some(board_id.into());
        self
    }

    /// Replace the dispatcher tuning
    pub fn dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Replace the realtime tuning
    pub fn realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = Some(realtime);
        self
    }

    /// Replace the store tuning
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.store = Some(store);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let defaults = ClientConfig::default();
        let config = ClientConfig {
            server_url: self.server_url.unwrap_or(defaults.server_url),
            board_id: self.board_id.unwrap_or(defaults.board_id),
            dispatch: self.dispatch.unwrap_or(defaults.dispatch),
            realtime: self.realtime.unwrap_or(defaults.realtime),
            store: self.store.unwrap_or(defaults.store),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("cannot read config file: {0}")]
    Io(String),
    #[error("cannot parse config file: {0}")]
    Parse(String),
}

/// On-disk representation; every field optional so partial files work
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    server_url: Option<String>,
    board_id: Option<String>,
    dispatch: Option<DispatchFile>,
    realtime: Option<RealtimeFile>,
    store: Option<StoreFile>,
}

#[derive(Debug, Default, Deserialize)]
struct DispatchFile {
    debounce_window_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    backoff_base_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
    backoff_cap_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RealtimeFile {
    heartbeat_interval_ms: Option<u64>,
    reconnect_base_ms: Option<u64>,
    reconnect_factor: Option<f64>,
    reconnect_cap_ms: Option<u64>,
    max_reconnect_attempts: Option<u32>,
    reconnect_jitter: Option<bool>,
    outbound_queue_cap: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct StoreFile {
    history_capacity: Option<usize>,
    latency_budget_ms: Option<u64>,
}

impl ConfigFile {
    fn merge_into(self, config: &mut ClientConfig) {
        if let Some(url) = self.server_url {
            config.server_url = url;
        }
        if let Some(board) = self.board_id {
            config.board_id = board;
        }
        if let Some(dispatch) = self.dispatch {
            let target = &mut config.dispatch;
            if let Some(ms) = dispatch.debounce_window_ms {
                target.debounce_window = Duration::from_millis(ms);
            }
            if let Some(ms) = dispatch.request_timeout_ms {
                target.request_timeout = Duration::from_millis(ms);
            }
            if let Some(n) = dispatch.max_retries {
                target.max_retries = n;
            }
            if let Some(ms) = dispatch.backoff_base_ms {
                target.backoff_base = Duration::from_millis(ms);
            }
            if let Some(m) = dispatch.backoff_multiplier {
                target.backoff_multiplier = m;
            }
            if let Some(ms) = dispatch.backoff_cap_ms {
                target.backoff_cap = Duration::from_millis(ms);
            }
        }
        if let Some(realtime) = self.realtime {
            let target = &mut config.realtime;
            if let Some(ms) = realtime.heartbeat_interval_ms {
                target.heartbeat_interval = Duration::from_millis(ms);
            }
            if let Some(ms) = realtime.reconnect_base_ms {
                target.reconnect_base = Duration::from_millis(ms);
            }
            if let Some(f) = realtime.reconnect_factor {
                target.reconnect_factor = f;
            }
            if let Some(ms) = realtime.reconnect_cap_ms {
                target.reconnect_cap = Duration::from_millis(ms);
            }
            if let Some(n) = realtime.max_reconnect_attempts {
                target.max_reconnect_attempts = n;
            }
            if let Some(j) = realtime.reconnect_jitter {
                target.reconnect_jitter = j;
            }
            if let Some(cap) = realtime.outbound_queue_cap {
                target.outbound_queue_cap = cap;
            }
        }
        if let Some(store) = self.store {
            let target = &mut config.store;
            if let Some(cap) = store.history_capacity {
                target.history_capacity = cap;
            }
            if let Some(ms) = store.latency_budget_ms {
                target.latency_budget = Duration::from_millis(ms);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "http://127.0.0.1:3000");
        assert_eq!(config.dispatch.max_retries, 3);
        assert_eq!(config.dispatch.backoff_cap, Duration::from_millis(10_000));
        assert_eq!(config.realtime.outbound_queue_cap, 100);
        assert_eq!(config.store.history_capacity, 50);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ClientConfig::builder()
            .server_url("https://board.example.com")
            .board_id("sprint-12")
            .build()
            .unwrap();
        assert_eq!(config.server_url, "https://board.example.com");
        assert_eq!(config.board_id, "sprint-12");
    }

    #[test]
    fn test_builder_rejects_bad_url() {
        let result = ClientConfig::builder().server_url("board.example.com").build();
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_api_url() {
        let config = ClientConfig::default();
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            config.api_url(&format!("/api/tasks/{id}/status")),
            format!("http://127.0.0.1:3000/api/tasks/{id}/status")
        );
    }

    #[test]
    fn test_realtime_url_scheme() {
        let config = ClientConfig::builder()
            .server_url("https://board.example.com")
            .build()
            .unwrap();
        assert_eq!(config.realtime_url(), "wss://board.example.com/ws");
    }

    #[test]
    fn test_partial_toml_merge() {
        let raw = r#"
            server_url = "http://10.0.0.5:8080"

            [dispatch]
            max_retries = 5
            backoff_base_ms = 250

            [store]
            history_capacity = 10
        "#;
        let file: ConfigFile = toml::from_str(raw).unwrap();
        let mut config = ClientConfig::default();
        file.merge_into(&mut config);
        assert_eq!(config.server_url, "http://10.0.0.5:8080");
        assert_eq!(config.dispatch.max_retries, 5);
        assert_eq!(config.dispatch.backoff_base, Duration::from_millis(250));
        // untouched sections keep their defaults
        assert_eq!(config.dispatch.request_timeout, Duration::from_millis(30_000));
        assert_eq!(config.store.history_capacity, 10);
        assert_eq!(config.realtime.max_reconnect_attempts, 5);
    }
}
