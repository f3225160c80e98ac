//! Configuration system for the Pulsoid OSC bridge
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (PULSOID_BRIDGE_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values
//!
//! The loaded value is immutable once handed to the clients; each client
//! receives only the section it needs.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::osc::OscClientConfig;
use crate::stream::{ReconnectPolicy, StreamClientConfig};

/// Default Pulsoid real-time WebSocket endpoint
pub const DEFAULT_STREAM_URL: &str = "wss://dev.pulsoid.net/api/v1/data/real_time";

/// Main bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Heart-rate stream connection settings
    pub stream: StreamSettings,

    /// Reconnection policy
    pub reconnect: ReconnectSettings,

    /// OSC output settings
    pub osc: OscSettings,

    /// Pulsoid authorization settings
    pub auth: AuthSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Heart-rate stream connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// WebSocket URL of the real-time endpoint
    pub url: String,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Interval between protocol pings in seconds
    pub ping_interval_secs: u64,

    /// Time to wait for a pong in seconds
    pub ping_timeout_secs: u64,
}

/// Reconnection policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Delay before the first reconnection attempt in milliseconds
    pub initial_delay_ms: u64,

    /// Upper bound for the reconnection delay in milliseconds
    pub max_delay_ms: u64,

    /// Delay growth factor
    pub multiplier: f64,

    /// Reconnection attempts before giving up (must be at least 1)
    pub max_attempts: u32,
}

/// OSC output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OscSettings {
    /// Host of the OSC receiver
    pub host: String,

    /// UDP port of the OSC receiver
    pub port: u16,

    /// Address prefix for every parameter
    pub parameter_prefix: String,

    /// Boolean parameter reporting that the bridge is alive
    pub status_parameter: String,

    /// Keepalive interval in seconds
    pub keepalive_interval_secs: u64,
}

/// Pulsoid OAuth settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// OAuth authorize endpoint
    pub authorize_url: String,

    /// OAuth client identifier
    pub client_id: String,

    /// Redirect URI registered for the client (empty for web_page mode)
    pub redirect_uri: String,

    /// Requested scope
    pub scope: String,

    /// File holding the access token
    pub token_file: String,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            connect_timeout_ms: 30_000,
            ping_interval_secs: 30,
            ping_timeout_secs: 10,
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl Default for OscSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            parameter_prefix: "/avatar/parameters/".to_string(),
            status_parameter: "PulsoidConnected".to_string(),
            keepalive_interval_secs: 30,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            authorize_url: "https://pulsoid.net/oauth2/authorize".to_string(),
            client_id: "dface9ca-0fcb-4b31-8874-dd4adadbbb07".to_string(),
            redirect_uri: String::new(),
            scope: "data:heart_rate:read".to_string(),
            token_file: "~/.pulsoid-osc-bridge/token.txt".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| {
                Error::config_parse(format!("{}: {}", path.display(), e.message()), e)
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        config.apply_env_overrides();
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            return if path.exists() {
                Ok(Some(path))
            } else {
                Err(Error::config_not_found(path))
            };
        }

        let search_paths = [
            Some(PathBuf::from("pulsoid-osc-bridge.toml")),
            Some(PathBuf::from("config.toml")),
            dirs::config_dir().map(|p| p.join("pulsoid-osc-bridge").join("config.toml")),
            dirs::home_dir().map(|p| p.join(".pulsoid-osc-bridge").join("config.toml")),
        ];

        for path in search_paths.into_iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PULSOID_BRIDGE_STREAM_URL") {
            self.stream.url = val;
        }
        if let Some(n) = env_parse("PULSOID_BRIDGE_CONNECT_TIMEOUT_MS") {
            self.stream.connect_timeout_ms = n;
        }

        if let Some(n) = env_parse("PULSOID_BRIDGE_RECONNECT_INITIAL_MS") {
            self.reconnect.initial_delay_ms = n;
        }
        if let Some(n) = env_parse("PULSOID_BRIDGE_RECONNECT_MAX_MS") {
            self.reconnect.max_delay_ms = n;
        }
        if let Some(n) = env_parse("PULSOID_BRIDGE_MAX_RECONNECT_ATTEMPTS") {
            self.reconnect.max_attempts = n;
        }

        if let Ok(val) = std::env::var("PULSOID_BRIDGE_OSC_HOST") {
            self.osc.host = val;
        }
        if let Some(n) = env_parse("PULSOID_BRIDGE_OSC_PORT") {
            self.osc.port = n;
        }
        if let Some(n) = env_parse("PULSOID_BRIDGE_KEEPALIVE_SECS") {
            self.osc.keepalive_interval_secs = n;
        }

        if let Ok(val) = std::env::var("PULSOID_BRIDGE_CLIENT_ID") {
            self.auth.client_id = val;
        }
        if let Ok(val) = std::env::var("PULSOID_BRIDGE_TOKEN_FILE") {
            self.auth.token_file = val;
        }

        if let Ok(val) = std::env::var("PULSOID_BRIDGE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("PULSOID_BRIDGE_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("PULSOID_BRIDGE_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        self.auth.token_file = expand_path(&self.auth.token_file);

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        let url = &self.stream.url;
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(Error::config_field_invalid(
                "stream.url",
                format!("Stream URL must start with ws:// or wss://, got '{}'", url),
            ));
        }
        if url::Url::parse(url).is_err() {
            return Err(Error::config_field_invalid(
                "stream.url",
                format!("Stream URL '{}' is not a valid URL", url),
            ));
        }
        if self.stream.connect_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "stream.connect_timeout_ms",
                "Connect timeout must be greater than zero",
            ));
        }
        if self.stream.ping_interval_secs == 0 || self.stream.ping_timeout_secs == 0 {
            return Err(Error::config_field_invalid(
                "stream.ping_interval_secs",
                "Ping interval and timeout must be greater than zero",
            ));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(Error::config_field_invalid(
                "reconnect.max_attempts",
                "max_attempts must be at least 1",
            ));
        }
        if !(self.reconnect.multiplier >= 1.0) {
            return Err(Error::config_field_invalid(
                "reconnect.multiplier",
                "multiplier must be 1.0 or greater",
            ));
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(Error::config_field_invalid(
                "reconnect.initial_delay_ms",
                "initial_delay_ms must not exceed max_delay_ms",
            ));
        }

        if self.osc.host.trim().is_empty() {
            return Err(Error::config_field_invalid("osc.host", "OSC host cannot be empty"));
        }
        if self.osc.port == 0 {
            return Err(Error::config_field_invalid("osc.port", "OSC port cannot be 0"));
        }
        if self.osc.keepalive_interval_secs == 0 {
            return Err(Error::config_field_invalid(
                "osc.keepalive_interval_secs",
                "Keepalive interval must be greater than zero",
            ));
        }
        if !self.osc.parameter_prefix.starts_with('/') {
            return Err(Error::config_field_invalid(
                "osc.parameter_prefix",
                "OSC addresses must start with '/'",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Settings for the stream ingestion client
    pub fn stream_client_config(&self) -> StreamClientConfig {
        StreamClientConfig {
            url: self.stream.url.clone(),
            connect_timeout: Duration::from_millis(self.stream.connect_timeout_ms),
            ping_interval: Duration::from_secs(self.stream.ping_interval_secs),
            ping_timeout: Duration::from_secs(self.stream.ping_timeout_secs),
            policy: ReconnectPolicy {
                initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
                multiplier: self.reconnect.multiplier,
                max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
                max_attempts: self.reconnect.max_attempts,
            },
            ..StreamClientConfig::default()
        }
    }

    /// Settings for the OSC emission client
    pub fn osc_client_config(&self) -> OscClientConfig {
        OscClientConfig {
            host: self.osc.host.clone(),
            port: self.osc.port,
            parameter_prefix: self.osc.parameter_prefix.clone(),
            status_parameter: self.osc.status_parameter.clone(),
            keepalive_interval: Duration::from_secs(self.osc.keepalive_interval_secs),
        }
    }
}

/// Parse an environment variable, ignoring unset or unparsable values
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Expand ~ and environment variables in paths
pub fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<()> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".pulsoid-osc-bridge")
                .join("config.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::ConfigValidation {
            message: format!(
                "Configuration file already exists: {}. Use --force to overwrite.",
                config_path.display()
            ),
            field: None,
        });
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    println!("Configuration file created: {}", config_path.display());
    Ok(())
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    format!(
        r#"# Pulsoid OSC Bridge Configuration

[stream]
# Pulsoid real-time WebSocket endpoint
url = "{url}"

# Connection timeout in milliseconds
connect_timeout_ms = 30000

# Protocol ping interval and pong timeout in seconds
ping_interval_secs = 30
ping_timeout_secs = 10

[reconnect]
# Exponential backoff between reconnection attempts
initial_delay_ms = 1000
max_delay_ms = 30000
multiplier = 2.0

# The bridge exits after this many failed reconnection attempts in a row
max_attempts = 5

[osc]
# VRChat listens for OSC input on 127.0.0.1:9000 by default
host = "127.0.0.1"
port = 9000
parameter_prefix = "/avatar/parameters/"

# Boolean parameter set while the bridge is running
status_parameter = "PulsoidConnected"
keepalive_interval_secs = 30

[auth]
# Where the Pulsoid access token is stored
token_file = "~/.pulsoid-osc-bridge/token.txt"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.pulsoid-osc-bridge/logs/bridge.log"

max_file_size_mb = 100
max_files = 5
json_format = false
"#,
        url = DEFAULT_STREAM_URL
    )
}
