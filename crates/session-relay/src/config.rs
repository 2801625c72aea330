//! Session relay configuration.
//!
//! Configuration is loaded from environment variables. Every setting has a
//! default; malformed values are rejected rather than silently replaced.

use common::config::{ObservabilityConfig, DEFAULT_LOG_FILTER};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use thiserror::Error;

/// Default WebSocket gateway bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default per-connection outbound mailbox size.
pub const DEFAULT_CONNECTION_BUFFER: usize = 200;

/// Default relay instance ID prefix.
pub const DEFAULT_RELAY_ID_PREFIX: &str = "relay";

/// Session relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket gateway bind address (default: "0.0.0.0:8000").
    pub bind_address: String,

    /// Health and metrics bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Unique identifier for this relay instance (appears in logs).
    pub relay_id: String,

    /// Outbound mailbox capacity per connection. Events beyond it are dropped.
    pub connection_buffer: usize,

    /// Tell senders when a moderation command is refused.
    pub report_moderation_denials: bool,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = parse_address(vars, "RELAY_BIND_ADDRESS", DEFAULT_BIND_ADDRESS)?;

        let health_bind_address = parse_address(
            vars,
            "RELAY_HEALTH_BIND_ADDRESS",
            DEFAULT_HEALTH_BIND_ADDRESS,
        )?;

        let connection_buffer = match vars.get("RELAY_CONNECTION_BUFFER") {
            Some(raw) => {
                let value: usize = raw.parse().map_err(|_| {
                    ConfigError::InvalidValue(format!(
                        "RELAY_CONNECTION_BUFFER must be a positive integer, got '{raw}'"
                    ))
                })?;
                if value == 0 {
                    return Err(ConfigError::InvalidValue(
                        "RELAY_CONNECTION_BUFFER must be greater than zero".to_string(),
                    ));
                }
                value
            }
            None => DEFAULT_CONNECTION_BUFFER,
        };

        let report_moderation_denials =
            parse_bool(vars, "RELAY_REPORT_MODERATION_DENIALS", false)?;

        let observability = ObservabilityConfig {
            log_filter: vars
                .get("RUST_LOG")
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            json_logs: parse_bool(vars, "RELAY_LOG_JSON", false)?,
        };

        // Generate relay instance ID
        let relay_id = vars.get("RELAY_ID").cloned().unwrap_or_else(|| {
            let hostname = vars
                .get("HOSTNAME")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().simple().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RELAY_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            health_bind_address,
            relay_id,
            connection_buffer,
            report_moderation_denials,
            observability,
        })
    }
}

fn parse_address(
    vars: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let value = vars.get(key).map_or(default, String::as_str);
    value.parse::<SocketAddr>().map_err(|_| {
        ConfigError::InvalidValue(format!("{key} must be a socket address, got '{value}'"))
    })?;
    Ok(value.to_string())
}

fn parse_bool(vars: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match vars.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue(format!(
            "{key} must be true or false, got '{v}'"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config =
            Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.connection_buffer, DEFAULT_CONNECTION_BUFFER);
        assert!(!config.report_moderation_denials);
        assert_eq!(config.observability, ObservabilityConfig::default());
        // Relay ID should be auto-generated
        assert!(config.relay_id.starts_with("relay-unknown-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            ("RELAY_BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string()),
            (
                "RELAY_HEALTH_BIND_ADDRESS".to_string(),
                "127.0.0.1:9001".to_string(),
            ),
            ("RELAY_ID".to_string(), "relay-test-001".to_string()),
            ("RELAY_CONNECTION_BUFFER".to_string(), "16".to_string()),
            (
                "RELAY_REPORT_MODERATION_DENIALS".to_string(),
                "true".to_string(),
            ),
            ("RELAY_LOG_JSON".to_string(), "1".to_string()),
            ("RUST_LOG".to_string(), "info".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.health_bind_address, "127.0.0.1:9001");
        assert_eq!(config.relay_id, "relay-test-001");
        assert_eq!(config.connection_buffer, 16);
        assert!(config.report_moderation_denials);
        assert!(config.observability.json_logs);
        assert_eq!(config.observability.log_filter, "info");
    }

    #[test]
    fn test_relay_id_uses_hostname() {
        let vars = HashMap::from([("HOSTNAME".to_string(), "node-7".to_string())]);
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert!(config.relay_id.starts_with("relay-node-7-"));
        assert_eq!(config.relay_id.len(), "relay-node-7-".len() + 8);
    }

    #[test]
    fn test_zero_connection_buffer_rejected() {
        let vars = HashMap::from([("RELAY_CONNECTION_BUFFER".to_string(), "0".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_non_numeric_connection_buffer_rejected() {
        let vars = HashMap::from([("RELAY_CONNECTION_BUFFER".to_string(), "lots".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("lots")));
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let vars = HashMap::from([(
            "RELAY_REPORT_MODERATION_DENIALS".to_string(),
            "maybe".to_string(),
        )]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_invalid_bind_address_rejected() {
        let vars = HashMap::from([("RELAY_BIND_ADDRESS".to_string(), "not-an-addr".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("RELAY_BIND_ADDRESS"))
        );
    }
}
