//! Health aggregation.
//!
//! # Data Flow
//! ```text
//! check_health()
//!     in flight, cached result   → return cached (stale but valid)
//!     in flight, nothing cached  → join the in-flight run
//!     idle                       → spawn run:
//!         connection ─┐
//!         functions  ─┼─ one task each → join_all → SystemHealth → cache
//!         memory     ─┘
//! ```
//!
//! # Design Decisions
//! - A failing or panicking check becomes an unhealthy result, never an error
//! - The run is spawned so it completes even if every caller goes away
//! - The in-flight marker is released by a drop guard inside the run

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};

use crate::config::ConnectionMode;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::health::checks::{connection_status, HealthCheck};
use crate::health::diagnostics::HealthDiagnostics;
use crate::health::types::{HealthCheckResult, HealthStatus, SystemHealth};
use crate::observability::metrics;

type PendingHealth = Shared<BoxFuture<'static, Arc<SystemHealth>>>;

#[derive(Default)]
struct AggregatorState {
    in_flight: Option<PendingHealth>,
    last: Option<Arc<SystemHealth>>,
}

fn lock(state: &Mutex<AggregatorState>) -> MutexGuard<'_, AggregatorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases the in-flight marker on every exit path of a run.
struct InFlightGuard {
    state: Arc<Mutex<AggregatorState>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.state).in_flight = None;
    }
}

/// Report metadata.
#[derive(Debug, Clone)]
pub struct ReportInfo {
    pub version: String,
    pub environment: String,
    pub started_at: Instant,
}

impl ReportInfo {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: environment.into(),
            started_at: Instant::now(),
        }
    }
}

/// Composes independent checks into a [`SystemHealth`] snapshot.
pub struct HealthAggregator {
    manager: Arc<ConnectionManager>,
    diagnostics: Arc<HealthDiagnostics>,
    checks: Vec<Arc<dyn HealthCheck>>,
    info: ReportInfo,
    state: Arc<Mutex<AggregatorState>>,
}

impl HealthAggregator {
    pub fn new(
        manager: Arc<ConnectionManager>,
        diagnostics: Arc<HealthDiagnostics>,
        checks: Vec<Arc<dyn HealthCheck>>,
        info: ReportInfo,
    ) -> Self {
        Self {
            manager,
            diagnostics,
            checks,
            info,
            state: Arc::new(Mutex::new(AggregatorState::default())),
        }
    }

    /// Add another check to every future run.
    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Last completed snapshot, if any.
    pub fn last_health(&self) -> Option<Arc<SystemHealth>> {
        lock(&self.state).last.clone()
    }

    /// Whether a run is currently in progress.
    pub fn is_checking(&self) -> bool {
        lock(&self.state).in_flight.is_some()
    }

    /// Run every check, or reuse the run already in progress.
    pub async fn check_health(&self) -> Arc<SystemHealth> {
        let pending = {
            let mut state = lock(&self.state);
            if let Some(in_flight) = state.in_flight.clone() {
                if let Some(last) = state.last.clone() {
                    tracing::debug!("Health check in progress, returning cached result");
                    return last;
                }
                in_flight
            } else {
                let pending = self.spawn_run();
                state.in_flight = Some(pending.clone());
                pending
            }
        };
        pending.await
    }

    // Called with the state lock held; the run's guard cannot clear the marker
    // before it has been stored.
    fn spawn_run(&self) -> PendingHealth {
        let checks = self.checks.clone();
        let info = self.info.clone();
        let state = self.state.clone();

        let handle = tokio::spawn(async move {
            let _guard = InFlightGuard {
                state: state.clone(),
            };
            let health = Arc::new(run_checks(checks, &info).await);
            lock(&state).last = Some(health.clone());
            health
        });

        let environment = self.info.environment.clone();
        let version = self.info.version.clone();
        let started_at = self.info.started_at;
        async move {
            match handle.await {
                Ok(health) => health,
                Err(e) => {
                    tracing::error!(error = %e, "Health aggregation task failed");
                    Arc::new(SystemHealth {
                        overall: HealthStatus::Unhealthy,
                        version,
                        environment,
                        uptime_secs: started_at.elapsed().as_secs(),
                        timestamp: Utc::now(),
                        checks: BTreeMap::new(),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Connection-only status for liveness and readiness probes.
    pub fn connection_summary(&self) -> HealthCheckResult {
        if self.manager.mode() == ConnectionMode::Connectionless {
            return HealthCheckResult::healthy("Connectionless mode")
                .with_detail("sdk_state", ConnectionState::NotApplicable.as_str());
        }

        let info = self.diagnostics.inspect(&self.manager);
        HealthCheckResult::new(connection_status(&info), info.reason)
            .with_detail("sdk_state", info.sdk_state.as_str())
            .with_detail("using_deep_check", info.using_deep_check)
    }

    pub fn liveness(&self) -> HealthCheckResult {
        self.connection_summary()
    }

    /// Like liveness, but connected mode additionally requires ACTIVE.
    pub fn readiness(&self) -> HealthCheckResult {
        let summary = self.connection_summary();
        if self.manager.mode() == ConnectionMode::Connect {
            let state = self.manager.state();
            if state != ConnectionState::Active {
                return HealthCheckResult::unhealthy(format!("Connection not ready: state is {state}"))
                    .with_detail("sdk_state", state.as_str());
            }
        }
        summary
    }
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAggregator")
            .field("checks", &self.checks.iter().map(|c| c.name().to_string()).collect::<Vec<_>>())
            .field("environment", &self.info.environment)
            .finish()
    }
}

async fn run_checks(checks: Vec<Arc<dyn HealthCheck>>, info: &ReportInfo) -> SystemHealth {
    let tasks = checks.into_iter().map(|check| {
        let name = check.name().to_string();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = check.check().await;
            (outcome, started.elapsed())
        });
        async move { (name, task.await) }
    });

    let mut results = BTreeMap::new();
    for (name, joined) in join_all(tasks).await {
        let result = match joined {
            Ok((Ok(result), elapsed)) => {
                metrics::record_check(&name, result.status, elapsed);
                result.with_response_time_ms(elapsed.as_millis() as u64)
            }
            Ok((Err(e), elapsed)) => {
                tracing::warn!(check = %name, error = %e, "Health check failed");
                metrics::record_check(&name, HealthStatus::Unhealthy, elapsed);
                HealthCheckResult::unhealthy(e.to_string())
                    .with_response_time_ms(elapsed.as_millis() as u64)
            }
            Err(e) => {
                tracing::error!(check = %name, error = %e, "Health check task panicked");
                HealthCheckResult::unhealthy(format!("Health check panicked: {e}"))
            }
        };
        results.insert(name, result);
    }

    let overall = HealthStatus::worst(results.values().map(|r| r.status));
    SystemHealth {
        overall,
        version: info.version.clone(),
        environment: info.environment.clone(),
        uptime_secs: info.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
        checks: results,
    }
}
