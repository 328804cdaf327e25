//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the worker.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::ConnectOptions;

/// Root configuration for the worker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Connected (persistent connection) or connectionless operation.
    pub mode: ConnectionMode,

    /// Deployment environment reported in health snapshots.
    pub environment: String,

    /// Function IDs seeded into the in-memory registry at startup.
    pub functions: Vec<String>,

    /// Dispatcher connection settings.
    pub connection: ConnectionConfig,

    /// Health policy settings.
    pub health: HealthConfig,

    /// Admin HTTP surface.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::default(),
            environment: "development".to_string(),
            functions: Vec::new(),
            connection: ConnectionConfig::default(),
            health: HealthConfig::default(),
            admin: AdminConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// How the worker talks to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Hold a persistent connection to the dispatcher.
    #[default]
    Connect,
    /// No persistent connection; connection health is not applicable.
    Connectionless,
}

/// Dispatcher connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Dispatcher endpoint (ws:// or wss://).
    pub url: String,

    /// Stable identifier for this worker instance.
    pub instance_id: Option<String>,

    /// Maximum concurrent executions the dispatcher may assign.
    pub max_concurrency: Option<u32>,

    /// Let the transport install its own shutdown signal handlers.
    pub handle_shutdown_signals: bool,

    /// Interval between liveness pings in seconds.
    pub heartbeat_interval_secs: u64,

    /// Graceful close deadline in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl ConnectionConfig {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            instance_id: self.instance_id.clone(),
            max_concurrency: self.max_concurrency,
            handle_shutdown_signals: self.handle_shutdown_signals,
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8288/v0/connect".to_string(),
            instance_id: None,
            max_concurrency: None,
            handle_shutdown_signals: false,
            heartbeat_interval_secs: 10,
            shutdown_timeout_ms: 30_000,
        }
    }
}

/// Health policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive missed heartbeats that make the connection unhealthy.
    pub heartbeat_failure_threshold: u32,

    /// Resident memory budget in megabytes.
    pub memory_limit_mb: u64,

    /// Fraction of the budget above which memory is degraded.
    pub memory_degraded_ratio: f64,

    /// Fraction of the budget above which memory is unhealthy.
    pub memory_unhealthy_ratio: f64,

    /// Run the periodic health monitor.
    pub monitor_enabled: bool,

    /// Health monitor interval in seconds.
    pub monitor_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_failure_threshold: 2,
            memory_limit_mb: 512,
            memory_degraded_ratio: 0.75,
            memory_unhealthy_ratio: 0.90,
            monitor_enabled: true,
            monitor_interval_secs: 30,
        }
    }
}

/// Admin HTTP surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve health endpoints.
    pub enabled: bool,

    /// Bind address (e.g., "0.0.0.0:8090").
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8090".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Prometheus exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "worker_link=info,tower_http=info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
