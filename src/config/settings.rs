use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::indicator::Endpoint;

/// Fallback push-channel URL when no build-time default is baked in.
const LOCAL_COUNTER_ENDPOINT: &str = "ws://localhost:8000/ws/counter";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub indicator: IndicatorConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Route the counter channel is served on
    #[serde(default = "default_ws_path")]
    pub path: String,
    /// Heartbeat interval in seconds (server sends ping)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Connection timeout in seconds (disconnect if no activity)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Cleanup task interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Seconds to wait for clients to leave during shutdown
    #[serde(default = "default_shutdown_drain_timeout")]
    pub shutdown_drain_timeout: u64,
}

/// Push-channel client settings, resolved once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_indicator_endpoint")]
    pub endpoint: String,
    /// Seconds allowed for the WebSocket handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_pulse_interval_ms")]
    pub pulse_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_ws_path() -> String {
    "/ws/counter".to_string()
}

fn default_heartbeat_interval() -> u64 {
    30 // 30 seconds
}

fn default_connection_timeout() -> u64 {
    120 // 2 minutes
}

fn default_cleanup_interval() -> u64 {
    60 // 1 minute
}

fn default_max_connections() -> usize {
    10_000
}

fn default_shutdown_drain_timeout() -> u64 {
    10
}

/// Endpoint baked in at compile time via `LIVE_COUNTER_ENDPOINT`, if set.
pub fn default_indicator_endpoint() -> String {
    option_env!("LIVE_COUNTER_ENDPOINT")
        .unwrap_or(LOCAL_COUNTER_ENDPOINT)
        .to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_pulse_interval_ms() -> u64 {
    600
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "live-counter".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // LIVE_COUNTER_SERVER__PORT, LIVE_COUNTER_INDICATOR__ENDPOINT, ...
            .add_source(
                Environment::with_prefix("LIVE_COUNTER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would only fail later at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.websocket.path.starts_with('/') {
            return Err(ConfigError::Message(format!(
                "websocket.path must start with '/': {}",
                self.websocket.path
            )));
        }
        if self.websocket.heartbeat_interval == 0 || self.websocket.cleanup_interval == 0 {
            return Err(ConfigError::Message(
                "websocket heartbeat and cleanup intervals must be non-zero".into(),
            ));
        }
        if self.websocket.connection_timeout == 0 {
            return Err(ConfigError::Message(
                "websocket.connection_timeout must be non-zero".into(),
            ));
        }
        if self.indicator.connect_timeout == 0 {
            return Err(ConfigError::Message(
                "indicator.connect_timeout must be non-zero".into(),
            ));
        }
        if self.websocket.max_connections == 0 {
            return Err(ConfigError::Message(
                "websocket.max_connections must be non-zero".into(),
            ));
        }
        if self.indicator.pulse_interval_ms == 0 {
            return Err(ConfigError::Message(
                "indicator.pulse_interval_ms must be non-zero".into(),
            ));
        }
        Endpoint::parse(&self.indicator.endpoint)
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: default_ws_path(),
            heartbeat_interval: default_heartbeat_interval(),
            connection_timeout: default_connection_timeout(),
            cleanup_interval: default_cleanup_interval(),
            max_connections: default_max_connections(),
            shutdown_drain_timeout: default_shutdown_drain_timeout(),
        }
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_indicator_endpoint(),
            connect_timeout: default_connect_timeout(),
            pulse_interval_ms: default_pulse_interval_ms(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            websocket: WebSocketConfig::default(),
            indicator: IndicatorConfig::default(),
            otel: OtelConfig::default(),
        }
    }
}
