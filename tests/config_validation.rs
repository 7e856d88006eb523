//! Integration tests for configuration loading and validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use secure_bridge::config::{
    BreakerConfig, BridgeConfig, LoggingConfig, RetryConfig, TokenConfig, TransportConfig,
};
use secure_bridge::generate_keypair;
use serial_test::serial;
use std::time::Duration;
use tracing::Level;

/// Smallest configuration that passes validation.
fn valid_config() -> BridgeConfig {
    let (_, peer_public) = generate_keypair().unwrap();
    BridgeConfig::default_with_overrides(|c| {
        c.endpoint.peer_public_key = Some(peer_public);
    })
}

fn has_error(config: &BridgeConfig, needle: &str) -> bool {
    let errors = config.validate();
    errors.iter().any(|e| e.contains(needle))
}

const ENV_VARS: &[&str] = &[
    "SECURE_BRIDGE_SERVER_HOST",
    "SECURE_BRIDGE_SERVER_PORT",
    "SECURE_BRIDGE_CLIENT_HOST",
    "SECURE_BRIDGE_CLIENT_PORT",
    "SECURE_BRIDGE_PRIVATE_KEY",
    "SECURE_BRIDGE_PUBLIC_KEY",
    "SECURE_BRIDGE_PEER_PUBLIC_KEY",
    "SECURE_BRIDGE_SHARED_SECRET",
    "SECURE_BRIDGE_TOKEN_TTL_SECS",
    "SECURE_BRIDGE_ROTATION_INTERVAL_SECS",
    "SECURE_BRIDGE_FAILURE_THRESHOLD",
    "SECURE_BRIDGE_MAX_ATTEMPTS",
    "SECURE_BRIDGE_CONNECT_TIMEOUT_MS",
    "SECURE_BRIDGE_RESPONSE_TIMEOUT_MS",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

#[test]
fn test_defaults_match_documented_values() {
    let config = BridgeConfig::default();
    assert_eq!(config.endpoint.server_address(), "127.0.0.1:5555");
    assert_eq!(config.endpoint.client_address(), "127.0.0.1:5556");
    assert_eq!(config.token.ttl, Duration::from_secs(300));
    assert_eq!(config.token.rotation_interval, Duration::from_secs(3600));
    assert_eq!(config.breaker.failure_threshold, 3);
    assert_eq!(config.breaker.recovery_timeout, Duration::from_secs(30));
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay, Duration::from_secs(1));
    assert_eq!(config.retry.max_delay, Duration::from_secs(10));
}

#[test]
fn test_default_config_requires_peer_key() {
    assert!(has_error(&BridgeConfig::default(), "peer_public_key must be set"));
    assert!(valid_config().validate().is_empty());
}

#[test]
fn test_allow_any_peer_waives_peer_key() {
    let config = BridgeConfig::default_with_overrides(|c| c.endpoint.allow_any_peer = true);
    assert!(config.validate().is_empty(), "{:?}", config.validate());
}

#[test]
fn test_empty_hosts() {
    let mut config = valid_config();
    config.endpoint.server_host = String::new();
    config.endpoint.client_host = String::new();
    assert!(has_error(&config, "Server host cannot be empty"));
    assert!(has_error(&config, "Client host cannot be empty"));
}

#[test]
fn test_ephemeral_server_port_allowed_but_client_port_required() {
    let mut config = valid_config();
    config.endpoint.server_port = 0;
    assert!(config.validate().is_empty());

    config.endpoint.client_port = 0;
    assert!(has_error(&config, "Client port must be greater than 0"));
}

#[test]
fn test_malformed_keys() {
    let mut config = valid_config();
    config.endpoint.private_key = Some("too-short".into());
    config.endpoint.peer_public_key = Some("~".repeat(40));
    assert!(has_error(&config, "Invalid private_key"));
    assert!(has_error(&config, "Invalid peer_public_key"));
}

#[test]
fn test_public_key_without_private_key() {
    let (_, public) = generate_keypair().unwrap();
    let mut config = valid_config();
    config.endpoint.public_key = Some(public);
    assert!(has_error(&config, "public_key given without private_key"));
}

#[test]
fn test_short_shared_secret() {
    let mut config = valid_config();
    config.endpoint.shared_secret = Some("short".into());
    assert!(has_error(&config, "Shared secret too short"));

    config.endpoint.shared_secret = Some("s".repeat(32));
    assert!(config.validate().is_empty());
}

#[test]
fn test_token_bounds() {
    let mut config = valid_config();
    config.token = TokenConfig {
        ttl: Duration::ZERO,
        rotation_interval: Duration::from_secs(8 * 24 * 3600),
        accept_previous_secret: false,
    };
    assert!(has_error(&config, "Token TTL too short"));
    assert!(has_error(&config, "Rotation interval too long"));
}

#[test]
fn test_token_ttl_must_undercut_rotation() {
    let mut config = valid_config();
    config.token.ttl = Duration::from_secs(3600);
    config.token.rotation_interval = Duration::from_secs(3600);
    assert!(has_error(&config, "must be shorter than the rotation interval"));

    // The grace period lets a token outlive one rotation
    config.token.accept_previous_secret = true;
    assert!(config.validate().is_empty());

    config.token.ttl = Duration::from_secs(7200);
    assert!(has_error(&config, "must be shorter than the rotation interval"));
}

#[test]
fn test_breaker_bounds() {
    let mut config = valid_config();
    config.breaker = BreakerConfig {
        failure_threshold: 0,
        recovery_timeout: Duration::from_millis(1),
    };
    assert!(has_error(&config, "Failure threshold must be greater than 0"));
    assert!(has_error(&config, "Recovery timeout too short"));
}

#[test]
fn test_retry_bounds() {
    let mut config = valid_config();
    config.retry = RetryConfig {
        max_attempts: 0,
        base_delay: Duration::from_secs(20),
        max_delay: Duration::from_secs(10),
    };
    assert!(has_error(&config, "Max attempts must be greater than 0"));
    assert!(has_error(&config, "Base delay cannot exceed max delay"));

    config.retry.max_attempts = 50;
    assert!(has_error(&config, "Max attempts too high"));
}

#[test]
fn test_transport_bounds() {
    let mut config = valid_config();
    config.transport = TransportConfig {
        connect_timeout: Duration::from_millis(10),
        handshake_timeout: Duration::from_millis(10),
        max_payload_size: 10,
        ..TransportConfig::default()
    };
    assert!(has_error(&config, "Connect timeout too short"));
    assert!(has_error(&config, "Handshake timeout too short"));
    assert!(has_error(&config, "Max payload size too small"));
}

#[test]
fn test_logging_without_outputs() {
    let mut config = valid_config();
    config.logging = LoggingConfig {
        log_to_console: false,
        log_to_file: false,
        ..LoggingConfig::default()
    };
    assert!(has_error(&config, "At least one logging output"));
}

#[test]
fn test_logging_file_requires_path() {
    let mut config = valid_config();
    config.logging.log_to_file = true;
    assert!(has_error(&config, "log_file_path must be specified"));

    config.logging.log_file_path = Some("/definitely/missing/dir/bridge.log".into());
    assert!(has_error(&config, "Log file directory does not exist"));
}

#[test]
fn test_validate_strict_lists_every_problem() {
    let mut config = BridgeConfig::default();
    config.retry.max_attempts = 0;
    let err = config.validate_strict().unwrap_err().to_string();
    assert!(err.contains("peer_public_key"));
    assert!(err.contains("Max attempts"));
}

#[test]
fn test_partial_toml_fills_defaults() {
    let (_, peer) = generate_keypair().unwrap();
    let config = BridgeConfig::from_toml(&format!(
        r#"
        [endpoint]
        server_port = 7000
        peer_public_key = "{peer}"
        allowed_addresses = ["127.0.0.1", "::1"]

        [breaker]
        failure_threshold = 5

        [logging]
        log_level = "debug"
        "#
    ))
    .unwrap();

    assert_eq!(config.endpoint.server_port, 7000);
    assert_eq!(config.endpoint.client_port, 5556);
    assert_eq!(config.endpoint.allowed_addresses.len(), 2);
    assert_eq!(config.breaker.failure_threshold, 5);
    assert_eq!(config.breaker.recovery_timeout, Duration::from_secs(30));
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.validate().is_empty());
}

#[test]
fn test_durations_are_milliseconds_in_toml() {
    let config = BridgeConfig::from_toml(
        r#"
        [retry]
        base_delay = 250
        max_delay = 4000
        "#,
    )
    .unwrap();
    assert_eq!(config.retry.base_delay, Duration::from_millis(250));
    assert_eq!(config.retry.max_delay, Duration::from_secs(4));
}

#[test]
fn test_invalid_toml_is_a_config_error() {
    let err = BridgeConfig::from_toml("[endpoint\nserver_port = ").unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bridge.toml");

    let mut config = valid_config();
    config.retry.max_attempts = 7;
    config.token.accept_previous_secret = true;
    config.save_to_file(&path).unwrap();

    let loaded = BridgeConfig::from_file(&path).unwrap();
    assert_eq!(loaded.retry.max_attempts, 7);
    assert!(loaded.token.accept_previous_secret);
    assert_eq!(loaded.endpoint.peer_public_key, config.endpoint.peer_public_key);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = BridgeConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to open config file"));
}

#[test]
fn test_example_config_parses_back() {
    let example = BridgeConfig::example_config();
    let parsed = BridgeConfig::from_toml(&example).unwrap();
    assert_eq!(parsed.endpoint.server_port, 5555);
}

#[test]
#[serial]
fn test_env_overrides() {
    clear_env();
    let (private, public) = generate_keypair().unwrap();
    std::env::set_var("SECURE_BRIDGE_SERVER_PORT", "6100");
    std::env::set_var("SECURE_BRIDGE_CLIENT_HOST", "10.0.0.8");
    std::env::set_var("SECURE_BRIDGE_PRIVATE_KEY", &private);
    std::env::set_var("SECURE_BRIDGE_PEER_PUBLIC_KEY", &public);
    std::env::set_var("SECURE_BRIDGE_TOKEN_TTL_SECS", "60");
    std::env::set_var("SECURE_BRIDGE_MAX_ATTEMPTS", "5");
    std::env::set_var("SECURE_BRIDGE_RESPONSE_TIMEOUT_MS", "1500");

    let config = BridgeConfig::from_env().unwrap();
    clear_env();

    assert_eq!(config.endpoint.server_port, 6100);
    assert_eq!(config.endpoint.client_address(), "10.0.0.8:5556");
    assert_eq!(config.endpoint.private_key.as_deref(), Some(private.as_str()));
    assert_eq!(config.token.ttl, Duration::from_secs(60));
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.transport.response_timeout, Duration::from_millis(1500));
    assert!(config.validate().is_empty());
}

#[test]
#[serial]
fn test_env_unparseable_numbers_are_ignored() {
    clear_env();
    std::env::set_var("SECURE_BRIDGE_SERVER_PORT", "not-a-port");
    std::env::set_var("SECURE_BRIDGE_FAILURE_THRESHOLD", "-3");

    let mut config = BridgeConfig::default();
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.endpoint.server_port, 5555);
    assert_eq!(config.breaker.failure_threshold, 3);
}
