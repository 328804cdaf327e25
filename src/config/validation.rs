//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ratios ordered)
//! - Check the dispatcher endpoint in connected mode
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: WorkerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{ConnectionMode, WorkerConfig};

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("connection.url '{0}' is not a ws:// or wss:// URL")]
    InvalidUrl(String),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("health memory ratios must satisfy 0 < degraded < unhealthy <= 1")]
    MemoryRatios,

    #[error("{field} '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &WorkerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.mode == ConnectionMode::Connect {
        let scheme_ok = Url::parse(&config.connection.url)
            .map(|url| matches!(url.scheme(), "ws" | "wss"))
            .unwrap_or(false);
        if !scheme_ok {
            errors.push(ValidationError::InvalidUrl(config.connection.url.clone()));
        }
    }

    if config.connection.shutdown_timeout_ms == 0 {
        errors.push(ValidationError::NotPositive("connection.shutdown_timeout_ms"));
    }
    if config.connection.heartbeat_interval_secs == 0 {
        errors.push(ValidationError::NotPositive("connection.heartbeat_interval_secs"));
    }
    if config.connection.max_concurrency == Some(0) {
        errors.push(ValidationError::NotPositive("connection.max_concurrency"));
    }
    if config.health.heartbeat_failure_threshold == 0 {
        errors.push(ValidationError::NotPositive("health.heartbeat_failure_threshold"));
    }
    if config.health.memory_limit_mb == 0 {
        errors.push(ValidationError::NotPositive("health.memory_limit_mb"));
    }
    if config.health.monitor_enabled && config.health.monitor_interval_secs == 0 {
        errors.push(ValidationError::NotPositive("health.monitor_interval_secs"));
    }

    let degraded = config.health.memory_degraded_ratio;
    let unhealthy = config.health.memory_unhealthy_ratio;
    if !(degraded > 0.0 && degraded < unhealthy && unhealthy <= 1.0) {
        errors.push(ValidationError::MemoryRatios);
    }

    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&WorkerConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = WorkerConfig::default();
        config.connection.url = "http://dispatcher".to_string();
        config.health.memory_degraded_ratio = 0.95;
        config.health.heartbeat_failure_threshold = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::MemoryRatios));
        assert!(errors.contains(&ValidationError::InvalidUrl("http://dispatcher".into())));
    }

    #[test]
    fn connectionless_mode_ignores_url() {
        let mut config = WorkerConfig::default();
        config.mode = ConnectionMode::Connectionless;
        config.connection.url = String::new();
        assert_eq!(validate_config(&config), Ok(()));
    }
}
