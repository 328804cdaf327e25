//! Health verdict and report types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::connection::ConnectionState;

/// Outcome of a single health check, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Worst status of a set: unhealthy over degraded over healthy.
    pub fn worst(statuses: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
        statuses.into_iter().max().unwrap_or(HealthStatus::Healthy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative verdict on the worker connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHealthInfo {
    pub is_healthy: bool,
    pub reason: String,
    /// Coarse state reported by the transport client.
    pub sdk_state: ConnectionState,
    pub transport_ready_state: Option<u8>,
    pub transport_state_name: Option<String>,
    pub pending_heartbeats: Option<u32>,
    pub connection_id: Option<String>,
    /// True when the verdict came from transport-level data.
    pub using_deep_check: bool,
}

/// Result of one independent health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, Value>>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl HealthCheckResult {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
            response_time_ms: None,
        }
    }

    pub fn healthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Healthy, message)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Degraded, message)
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unhealthy, message)
    }

    /// Add a detail entry, returning `self` for chaining.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_response_time_ms(mut self, millis: u64) -> Self {
        self.response_time_ms = Some(millis);
        self
    }
}

/// Aggregated snapshot of every health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub overall: HealthStatus,
    pub version: String,
    pub environment: String,
    pub uptime_secs: u64,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, HealthCheckResult>,
}

impl SystemHealth {
    pub fn check(&self, name: &str) -> Option<&HealthCheckResult> {
        self.checks.get(name)
    }
}

/// Failure raised by an individual check; becomes an unhealthy result.
#[derive(Debug, Clone, Error)]
pub enum CheckError {
    #[error("{0} unavailable: {1}")]
    Unavailable(&'static str, String),

    #[error("check failed: {0}")]
    Failed(String),
}
