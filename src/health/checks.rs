//! Individual health checks.
//!
//! # Checks
//! - `connection`: tiered diagnostics verdict mapped to a status
//! - `functions`: degraded while nothing is registered
//! - `memory`: resident memory against the configured budget
//!
//! # Design Decisions
//! - Checks return `Result`; the aggregator turns errors into unhealthy results
//! - Thresholds come from `HealthConfig` with the documented defaults

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use crate::config::HealthConfig;
use crate::connection::ConnectionManager;
use crate::health::diagnostics::HealthDiagnostics;
use crate::health::types::{CheckError, ConnectionHealthInfo, HealthCheckResult, HealthStatus};
use crate::registry::FunctionRegistry;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// A named, independently failing health check.
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self) -> BoxFuture<'_, Result<HealthCheckResult, CheckError>>;
}

/// Map a connection verdict onto the three-level status.
pub fn connection_status(info: &ConnectionHealthInfo) -> HealthStatus {
    if info.is_healthy {
        HealthStatus::Healthy
    } else if info.sdk_state.is_transient() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

/// Connection health via [`HealthDiagnostics`].
pub struct ConnectionCheck {
    manager: Arc<ConnectionManager>,
    diagnostics: Arc<HealthDiagnostics>,
}

impl ConnectionCheck {
    pub fn new(manager: Arc<ConnectionManager>, diagnostics: Arc<HealthDiagnostics>) -> Self {
        Self {
            manager,
            diagnostics,
        }
    }

    fn evaluate(&self) -> HealthCheckResult {
        let info = self.diagnostics.inspect(&self.manager);
        let mut result = HealthCheckResult::new(connection_status(&info), info.reason.clone())
            .with_detail("sdk_state", info.sdk_state.as_str())
            .with_detail("using_deep_check", info.using_deep_check);
        if let Some(id) = info.connection_id {
            result = result.with_detail("connection_id", id);
        }
        if let Some(name) = info.transport_state_name {
            result = result.with_detail("transport_state", name);
        }
        if let Some(pending) = info.pending_heartbeats {
            result = result.with_detail("pending_heartbeats", pending);
        }
        result
    }
}

impl HealthCheck for ConnectionCheck {
    fn name(&self) -> &str {
        "connection"
    }

    fn check(&self) -> BoxFuture<'_, Result<HealthCheckResult, CheckError>> {
        Box::pin(async move { Ok(self.evaluate()) })
    }
}

/// Registered-function presence.
pub struct FunctionRegistrationCheck {
    registry: Arc<dyn FunctionRegistry>,
}

impl FunctionRegistrationCheck {
    pub fn new(registry: Arc<dyn FunctionRegistry>) -> Self {
        Self { registry }
    }
}

impl HealthCheck for FunctionRegistrationCheck {
    fn name(&self) -> &str {
        "functions"
    }

    fn check(&self) -> BoxFuture<'_, Result<HealthCheckResult, CheckError>> {
        Box::pin(async move {
            let count = self.registry.function_count();
            let result = if count == 0 {
                HealthCheckResult::degraded("No functions registered")
            } else {
                HealthCheckResult::healthy(format!("{count} functions registered"))
            };
            Ok(result.with_detail("count", count))
        })
    }
}

/// Process memory sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
}

/// Source of process memory statistics.
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> Result<MemoryUsage, CheckError>;
}

/// Reads the current process's memory through `sysinfo`.
///
/// Only the current pid is refreshed on each sample.
pub struct SysinfoMemoryProbe {
    system: Mutex<System>,
}

impl SysinfoMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoMemoryProbe {
    fn sample(&self) -> Result<MemoryUsage, CheckError> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| CheckError::Unavailable("process id", e.to_string()))?;
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );
        let process = system
            .process(pid)
            .ok_or_else(|| CheckError::Unavailable("process memory", format!("pid {pid} not found")))?;
        Ok(MemoryUsage {
            resident_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        })
    }
}

/// Memory thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryPolicy {
    pub limit_bytes: u64,
    pub degraded_ratio: f64,
    pub unhealthy_ratio: f64,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            limit_bytes: 512 * BYTES_PER_MB,
            degraded_ratio: 0.75,
            unhealthy_ratio: 0.90,
        }
    }
}

impl From<&HealthConfig> for MemoryPolicy {
    fn from(config: &HealthConfig) -> Self {
        Self {
            limit_bytes: config.memory_limit_mb.saturating_mul(BYTES_PER_MB),
            degraded_ratio: config.memory_degraded_ratio,
            unhealthy_ratio: config.memory_unhealthy_ratio,
        }
    }
}

/// Resident memory against the configured budget.
pub struct MemoryCheck {
    probe: Arc<dyn MemoryProbe>,
    policy: MemoryPolicy,
}

impl MemoryCheck {
    pub fn new(probe: Arc<dyn MemoryProbe>, policy: MemoryPolicy) -> Self {
        Self { probe, policy }
    }

    fn evaluate(&self, usage: MemoryUsage) -> HealthCheckResult {
        let ratio = usage.resident_bytes as f64 / self.policy.limit_bytes.max(1) as f64;
        let used_mb = usage.resident_bytes / BYTES_PER_MB;
        let limit_mb = self.policy.limit_bytes / BYTES_PER_MB;
        let percent = ratio * 100.0;

        let result = if ratio > self.policy.unhealthy_ratio {
            HealthCheckResult::unhealthy(format!(
                "Memory usage critical: {used_mb} MB of {limit_mb} MB ({percent:.1}%)"
            ))
        } else if ratio > self.policy.degraded_ratio {
            HealthCheckResult::degraded(format!(
                "Memory usage high: {used_mb} MB of {limit_mb} MB ({percent:.1}%)"
            ))
        } else {
            HealthCheckResult::healthy(format!("Memory usage {used_mb} MB of {limit_mb} MB ({percent:.1}%)"))
        };

        result
            .with_detail("resident_mb", used_mb)
            .with_detail("virtual_mb", usage.virtual_bytes / BYTES_PER_MB)
            .with_detail("limit_mb", limit_mb)
            .with_detail("usage_percent", (percent * 10.0).round() / 10.0)
    }
}

impl HealthCheck for MemoryCheck {
    fn name(&self) -> &str {
        "memory"
    }

    fn check(&self) -> BoxFuture<'_, Result<HealthCheckResult, CheckError>> {
        Box::pin(async move {
            let usage = self.probe.sample()?;
            Ok(self.evaluate(usage))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::registry::InMemoryFunctionRegistry;

    struct FixedProbe(u64);

    impl MemoryProbe for FixedProbe {
        fn sample(&self) -> Result<MemoryUsage, CheckError> {
            Ok(MemoryUsage {
                resident_bytes: self.0 * BYTES_PER_MB,
                virtual_bytes: 2 * self.0 * BYTES_PER_MB,
            })
        }
    }

    async fn memory_status(resident_mb: u64) -> HealthStatus {
        let check = MemoryCheck::new(Arc::new(FixedProbe(resident_mb)), MemoryPolicy::default());
        check.check().await.unwrap().status
    }

    #[tokio::test]
    async fn memory_thresholds() {
        assert_eq!(memory_status(100).await, HealthStatus::Healthy);
        assert_eq!(memory_status(384).await, HealthStatus::Healthy);
        assert_eq!(memory_status(400).await, HealthStatus::Degraded);
        assert_eq!(memory_status(460).await, HealthStatus::Degraded);
        assert_eq!(memory_status(470).await, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn memory_details_are_reported() {
        let check = MemoryCheck::new(Arc::new(FixedProbe(256)), MemoryPolicy::default());
        let result = check.check().await.unwrap();
        let details = result.details.unwrap();
        assert_eq!(details["resident_mb"], 256);
        assert_eq!(details["limit_mb"], 512);
        assert_eq!(details["usage_percent"], 50.0);
    }

    #[test]
    fn sysinfo_probe_reads_own_process() {
        let probe = SysinfoMemoryProbe::new();
        let usage = probe.sample().unwrap();
        assert!(usage.resident_bytes > 0);

        let system = probe.system.lock().unwrap();
        assert_eq!(system.processes().len(), 1);
        drop(system);

        assert!(probe.sample().unwrap().resident_bytes > 0);
    }

    #[tokio::test]
    async fn empty_registry_is_degraded() {
        let registry = Arc::new(InMemoryFunctionRegistry::new());
        let check = FunctionRegistrationCheck::new(registry.clone());
        assert_eq!(check.check().await.unwrap().status, HealthStatus::Degraded);

        registry.register("nightly-report");
        let result = check.check().await.unwrap();
        assert_eq!(result.status, HealthStatus::Healthy);
        assert_eq!(result.message, "1 functions registered");
    }

    #[test]
    fn connection_status_mapping() {
        let mut info = ConnectionHealthInfo {
            is_healthy: false,
            reason: String::new(),
            sdk_state: ConnectionState::Reconnecting,
            transport_ready_state: None,
            transport_state_name: None,
            pending_heartbeats: None,
            connection_id: None,
            using_deep_check: false,
        };
        assert_eq!(connection_status(&info), HealthStatus::Degraded);

        info.sdk_state = ConnectionState::Closed;
        assert_eq!(connection_status(&info), HealthStatus::Unhealthy);

        info.is_healthy = true;
        assert_eq!(connection_status(&info), HealthStatus::Healthy);
    }
}
