//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Configuration currency settings.
    pub currency: CurrencyConfig,

    /// Configuration store backend.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8250").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8250".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Bound on each configuration store call in milliseconds.
    pub store_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            store_ms: 2_000,
        }
    }
}

/// How the gateway keeps its loaded configuration current.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CurrencyConfig {
    /// Seconds between background staleness checks. 0 disables polling.
    pub refresh_interval_secs: u64,

    /// Fraction of the interval used as random spread, so instances sharing
    /// a store do not poll in lockstep.
    pub jitter_ratio: f64,

    /// Engine error codes that trigger a check-and-retry.
    pub stale_error_codes: Vec<u32>,

    /// Watch a file store for new blobs instead of waiting for the next poll.
    pub watch_store: bool,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
            jitter_ratio: 0.1,
            stale_error_codes: vec![2207, 2208],
            watch_store: true,
        }
    }
}

/// Configuration store backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Process-local store, for development and tests.
    #[default]
    Memory,
    /// Directory of versioned JSON files shared between instances.
    File,
}

/// Configuration store settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,

    /// Directory for the file store. Required when `kind = "file"`.
    pub path: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Reject configuration and record mutations.
    pub read_only: bool,
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8250");
        assert_eq!(config.currency.stale_error_codes, vec![2207, 2208]);
        assert_eq!(config.store.kind, StoreKind::Memory);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert!(!config.security.read_only);
    }

    #[test]
    fn test_sections_parse() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [currency]
            refresh_interval_secs = 0
            stale_error_codes = [2207]

            [store]
            kind = "file"
            path = "/var/lib/gateway/config"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.currency.refresh_interval_secs, 0);
        assert_eq!(config.currency.stale_error_codes, vec![2207]);
        assert!(config.currency.watch_store);
        assert_eq!(config.store.kind, StoreKind::File);
        assert_eq!(config.store.path, Some(PathBuf::from("/var/lib/gateway/config")));
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
