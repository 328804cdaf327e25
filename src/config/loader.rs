//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::WorkerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<WorkerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<WorkerConfig, ConfigError> {
    let config: WorkerConfig = toml::from_str(content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionMode;
    use std::io::Write;

    #[test]
    fn minimal_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "environment = \"staging\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.environment, "staging");
        assert_eq!(config.mode, ConnectionMode::Connect);
        assert_eq!(config.connection.shutdown_timeout_ms, 30_000);
        assert_eq!(config.health.memory_limit_mb, 512);
        assert_eq!(config.health.heartbeat_failure_threshold, 2);
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_config(
            r#"
            mode = "connectionless"
            functions = ["send-welcome-email"]

            [connection]
            shutdown_timeout_ms = 5000

            [health]
            memory_limit_mb = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, ConnectionMode::Connectionless);
        assert_eq!(config.functions, vec!["send-welcome-email".to_string()]);
        assert_eq!(config.connection.shutdown_timeout_ms, 5000);
        assert_eq!(config.health.memory_limit_mb, 1024);
        assert!((config.health.memory_unhealthy_ratio - 0.90).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = parse_config("[connection]\nshutdown_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("shutdown_timeout_ms"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/worker.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
