//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check cross-field requirements (file store needs a path)
//! - Reject stale-retry codes that would mask genuine errors
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{GatewayConfig, StoreKind};
use crate::engine::EngineErrorKind;

/// A single semantic problem, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Check a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.timeouts.store_ms == 0 {
        errors.push(ValidationError::new("timeouts.store_ms", "must be greater than 0"));
    }

    let currency = &config.currency;
    if !(0.0..=1.0).contains(&currency.jitter_ratio) {
        errors.push(ValidationError::new("currency.jitter_ratio", "must be between 0.0 and 1.0"));
    }
    if currency.stale_error_codes.is_empty() {
        errors.push(ValidationError::new(
            "currency.stale_error_codes",
            "must name at least one code",
        ));
    }
    for &code in &currency.stale_error_codes {
        if let Some(kind) = masked_kind(code) {
            errors.push(ValidationError::new(
                "currency.stale_error_codes",
                format!("code {code} ({kind}) is never caused by a stale configuration"),
            ));
        }
    }

    if config.store.kind == StoreKind::File && config.store.path.is_none() {
        errors.push(ValidationError::new("store.path", "required when store.kind is \"file\""));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("'{}' is not one of {}", config.observability.log_level, LOG_LEVELS.join(", ")),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty when admin is enabled"));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Engine error kinds that retrying would only hide.
fn masked_kind(code: u32) -> Option<EngineErrorKind> {
    EngineErrorKind::from_code(code).filter(|kind| {
        matches!(
            kind,
            EngineErrorKind::InvalidInput
                | EngineErrorKind::NotFound
                | EngineErrorKind::PermissionDenied
                | EngineErrorKind::ResourceExhausted
                | EngineErrorKind::Internal
        )
    })
}
