//! # Configuration Management
//!
//! Centralized configuration for a bridge endpoint.
//!
//! One [`BridgeConfig`] describes both roles of a bridge instance: where the
//! server listens, which peer the client dials, the key material pinning
//! each side's identity, token lifetime and rotation, breaker thresholds,
//! retry policy and transport timeouts.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides (`SECURE_BRIDGE_*`)
//!
//! ## Security Considerations
//! - Keys travel as Z85 text (40 characters per key)
//! - `allow_any_peer` disables identity pinning and should stay off outside tests
//! - A `shared_secret` signs tokens only until the first rotation

use crate::error::{BridgeError, Result};
use crate::utils::timeout;
use crate::utils::z85;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Current supported protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Magic bytes to identify bridge frames (0x53425247 → "SBRG")
pub const MAGIC_BYTES: [u8; 4] = [0x53, 0x42, 0x52, 0x47];

/// Max allowed payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Default port the server role binds
pub const DEFAULT_SERVER_PORT: u16 = 5555;

/// Default port the client role dials
pub const DEFAULT_CLIENT_PORT: u16 = 5556;

/// Main bridge configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BridgeConfig {
    /// Addresses and key material
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Authorization token lifetime and rotation
    #[serde(default)]
    pub token: TokenConfig,

    /// Circuit breaker thresholds
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Client retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| BridgeError::Config(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| BridgeError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| BridgeError::Config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overlay `SECURE_BRIDGE_*` environment variables onto this configuration.
    ///
    /// Unparseable numeric values are ignored and leave the current setting.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SECURE_BRIDGE_SERVER_HOST") {
            self.endpoint.server_host = host;
        }
        if let Some(port) = env_parse::<u16>("SECURE_BRIDGE_SERVER_PORT") {
            self.endpoint.server_port = port;
        }
        if let Ok(host) = std::env::var("SECURE_BRIDGE_CLIENT_HOST") {
            self.endpoint.client_host = host;
        }
        if let Some(port) = env_parse::<u16>("SECURE_BRIDGE_CLIENT_PORT") {
            self.endpoint.client_port = port;
        }
        if let Ok(key) = std::env::var("SECURE_BRIDGE_PRIVATE_KEY") {
            self.endpoint.private_key = Some(key);
        }
        if let Ok(key) = std::env::var("SECURE_BRIDGE_PUBLIC_KEY") {
            self.endpoint.public_key = Some(key);
        }
        if let Ok(key) = std::env::var("SECURE_BRIDGE_PEER_PUBLIC_KEY") {
            self.endpoint.peer_public_key = Some(key);
        }
        if let Ok(secret) = std::env::var("SECURE_BRIDGE_SHARED_SECRET") {
            self.endpoint.shared_secret = Some(secret);
        }
        if let Some(secs) = env_parse::<u64>("SECURE_BRIDGE_TOKEN_TTL_SECS") {
            self.token.ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("SECURE_BRIDGE_ROTATION_INTERVAL_SECS") {
            self.token.rotation_interval = Duration::from_secs(secs);
        }
        if let Some(threshold) = env_parse::<u32>("SECURE_BRIDGE_FAILURE_THRESHOLD") {
            self.breaker.failure_threshold = threshold;
        }
        if let Some(attempts) = env_parse::<u32>("SECURE_BRIDGE_MAX_ATTEMPTS") {
            self.retry.max_attempts = attempts;
        }
        if let Some(ms) = env_parse::<u64>("SECURE_BRIDGE_CONNECT_TIMEOUT_MS") {
            self.transport.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("SECURE_BRIDGE_RESPONSE_TIMEOUT_MS") {
            self.transport.response_timeout = Duration::from_millis(ms);
        }
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| BridgeError::Config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.endpoint.validate());
        errors.extend(self.token.validate());
        errors.extend(self.breaker.validate());
        errors.extend(self.retry.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

/// Addresses and key material for both roles of a bridge
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Interface the server role binds
    pub server_host: String,

    /// Port the server role binds
    pub server_port: u16,

    /// Host of the peer the client role dials
    pub client_host: String,

    /// Port of the peer the client role dials
    pub client_port: u16,

    /// Own Z85 private key; a fresh pair is generated when absent
    #[serde(default)]
    pub private_key: Option<String>,

    /// Own Z85 public key; checked against the private key when present
    #[serde(default)]
    pub public_key: Option<String>,

    /// Z85 public key of the single trusted peer
    #[serde(default)]
    pub peer_public_key: Option<String>,

    /// Seed for the first token secret; random when absent
    #[serde(default)]
    pub shared_secret: Option<String>,

    /// Accept any client key that completes the handshake
    #[serde(default)]
    pub allow_any_peer: bool,

    /// Client addresses allowed to attempt a handshake (empty = all)
    #[serde(default)]
    pub allowed_addresses: Vec<IpAddr>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            server_host: String::from("127.0.0.1"),
            server_port: DEFAULT_SERVER_PORT,
            client_host: String::from("127.0.0.1"),
            client_port: DEFAULT_CLIENT_PORT,
            private_key: None,
            public_key: None,
            peer_public_key: None,
            shared_secret: None,
            allow_any_peer: false,
            allowed_addresses: Vec::new(),
        }
    }
}

impl EndpointConfig {
    /// Address the server role binds
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Address the client role dials
    pub fn client_address(&self) -> String {
        format!("{}:{}", self.client_host, self.client_port)
    }

    /// Validate endpoint configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server_host.is_empty() {
            errors.push("Server host cannot be empty".to_string());
        }
        if self.client_host.is_empty() {
            errors.push("Client host cannot be empty".to_string());
        }
        // server_port 0 binds an ephemeral port
        if self.client_port == 0 {
            errors.push("Client port must be greater than 0".to_string());
        }

        for (name, key) in [
            ("private_key", &self.private_key),
            ("public_key", &self.public_key),
            ("peer_public_key", &self.peer_public_key),
        ] {
            if let Some(text) = key {
                if z85::decode_key(text).is_err() {
                    errors.push(format!(
                        "Invalid {name}: expected {} Z85 characters",
                        z85::KEY_TEXT_LEN
                    ));
                }
            }
        }

        if self.public_key.is_some() && self.private_key.is_none() {
            errors.push("public_key given without private_key".to_string());
        }

        if self.peer_public_key.is_none() && !self.allow_any_peer {
            errors.push(
                "peer_public_key must be set unless allow_any_peer is enabled".to_string(),
            );
        }

        if let Some(ref secret) = self.shared_secret {
            if secret.len() < 32 {
                errors.push(format!(
                    "Shared secret too short: {} bytes (minimum: 32)",
                    secret.len()
                ));
            }
        }

        errors
    }
}

/// Authorization token settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Lifetime of an issued token. Rotation invalidates outstanding tokens,
    /// so this stays well below `rotation_interval`.
    #[serde(with = "duration_serde")]
    pub ttl: Duration,

    /// Interval between secret rotations
    #[serde(with = "duration_serde")]
    pub rotation_interval: Duration,

    /// Keep validating tokens signed under the previous secret
    #[serde(default)]
    pub accept_previous_secret: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            rotation_interval: Duration::from_secs(3600),
            accept_previous_secret: false,
        }
    }
}

impl TokenConfig {
    /// Validate token configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.ttl.as_secs() < 1 {
            errors.push("Token TTL too short (minimum: 1s)".to_string());
        }

        if self.rotation_interval.as_secs() < 1 {
            errors.push("Rotation interval too short (minimum: 1s)".to_string());
        } else if self.rotation_interval.as_secs() > 7 * 24 * 3600 {
            errors.push("Rotation interval too long (maximum: 7 days)".to_string());
        }

        // With the grace period a token survives one rotation
        let survives = if self.accept_previous_secret { 2 } else { 1 };
        if !self.rotation_interval.is_zero() && self.ttl >= self.rotation_interval * survives {
            errors.push(format!(
                "Token TTL ({}s) must be shorter than the rotation interval ({}s)",
                self.ttl.as_secs(),
                (self.rotation_interval * survives).as_secs()
            ));
        }

        errors
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Time the circuit stays open before a probe is admitted
    #[serde(with = "duration_serde")]
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl BreakerConfig {
    /// Validate breaker configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.failure_threshold == 0 {
            errors.push("Failure threshold must be greater than 0".to_string());
        }

        if self.recovery_timeout.as_millis() < 10 {
            errors.push("Recovery timeout too short (minimum: 10ms)".to_string());
        } else if self.recovery_timeout.as_secs() > 3600 {
            errors.push("Recovery timeout too long (maximum: 1 hour)".to_string());
        }

        errors
    }
}

/// Client retry settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per call, including the first
    pub max_attempts: u32,

    /// Unit of the exponential delay
    #[serde(with = "duration_serde")]
    pub base_delay: Duration,

    /// Upper bound on any single delay
    #[serde(with = "duration_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Validate retry configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_attempts == 0 {
            errors.push("Max attempts must be greater than 0".to_string());
        } else if self.max_attempts > 20 {
            errors.push(format!(
                "Max attempts too high: {} (maximum: 20)",
                self.max_attempts
            ));
        }

        if self.base_delay > self.max_delay {
            errors.push("Base delay cannot exceed max delay".to_string());
        }

        if self.max_delay.as_secs() > 300 {
            errors.push("Max delay too long (maximum: 300s)".to_string());
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Timeout for a client to establish the TCP connection
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Timeout for the reply to one request
    #[serde(with = "duration_serde")]
    pub response_timeout: Duration,

    /// Timeout for the whole handshake exchange
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// Timeout for connections to drain on shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Maximum allowed payload size in bytes
    pub max_payload_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: timeout::DEFAULT_TIMEOUT,
            response_timeout: Duration::from_secs(30),
            handshake_timeout: timeout::HANDSHAKE_TIMEOUT,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        if self.response_timeout.as_millis() < 100 {
            errors.push("Response timeout too short (minimum: 100ms)".to_string());
        }

        if self.handshake_timeout.as_millis() < 100 {
            errors.push("Handshake timeout too short (minimum: 100ms)".to_string());
        }

        if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.max_payload_size < 1024 {
            errors.push("Max payload size too small (minimum: 1 KB)".to_string());
        } else if self.max_payload_size > MAX_PAYLOAD_SIZE {
            errors.push(format!(
                "Max payload size too large: {} bytes (frame limit: {MAX_PAYLOAD_SIZE})",
                self.max_payload_size
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("secure-bridge"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
