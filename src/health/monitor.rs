//! Periodic health monitoring.
//!
//! # Responsibilities
//! - Run the aggregator on a fixed interval
//! - Log transitions of the overall status

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthConfig;
use crate::health::aggregator::HealthAggregator;
use crate::health::types::{HealthStatus, SystemHealth};

pub struct HealthMonitor {
    aggregator: Arc<HealthAggregator>,
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(aggregator: Arc<HealthAggregator>, config: HealthConfig) -> Self {
        Self { aggregator, config }
    }

    /// Run until `shutdown` fires. Returns the last observed overall status.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Option<HealthStatus> {
        if !self.config.monitor_enabled {
            tracing::info!("Health monitor disabled");
            return None;
        }

        tracing::info!(
            interval_secs = self.config.monitor_interval_secs,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.monitor_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut previous: Option<HealthStatus> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let health = self.aggregator.check_health().await;
                    if previous != Some(health.overall) {
                        log_transition(previous, &health.overall, &health);
                        previous = Some(health.overall);
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        previous
    }
}

fn log_transition(from: Option<HealthStatus>, to: &HealthStatus, health: &SystemHealth) {
    let failing: Vec<&str> = health
        .checks
        .iter()
        .filter(|(_, result)| result.status != HealthStatus::Healthy)
        .map(|(name, _)| name.as_str())
        .collect();
    let from = from.map(HealthStatus::as_str).unwrap_or("unknown");

    match to {
        HealthStatus::Healthy => tracing::info!(from, to = %to, "Worker health changed"),
        HealthStatus::Degraded => tracing::warn!(from, to = %to, ?failing, "Worker health changed"),
        HealthStatus::Unhealthy => tracing::error!(from, to = %to, ?failing, "Worker health changed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, ConnectionMode};
    use crate::connection::ConnectionManager;
    use crate::health::aggregator::ReportInfo;
    use crate::health::checks::{FunctionRegistrationCheck, HealthCheck};
    use crate::health::diagnostics::HealthDiagnostics;
    use crate::registry::InMemoryFunctionRegistry;
    use crate::transport::memory::MemoryTransport;

    fn aggregator(functions: &[&str]) -> Arc<HealthAggregator> {
        let manager = Arc::new(ConnectionManager::new(
            ConnectionMode::Connectionless,
            ConnectionConfig::default(),
            Arc::new(MemoryTransport::new()),
        ));
        let registry = Arc::new(InMemoryFunctionRegistry::with_functions(functions.iter().copied()));
        let checks: Vec<Arc<dyn HealthCheck>> = vec![Arc::new(FunctionRegistrationCheck::new(registry))];
        Arc::new(HealthAggregator::new(
            manager,
            Arc::new(HealthDiagnostics::default()),
            checks,
            ReportInfo::new("test"),
        ))
    }

    #[tokio::test]
    async fn monitor_runs_until_shutdown() {
        let agg = aggregator(&["a"]);
        let (tx, rx) = broadcast::channel(1);
        let config = HealthConfig {
            monitor_interval_secs: 1,
            ..HealthConfig::default()
        };

        let handle = tokio::spawn(HealthMonitor::new(agg.clone(), config).run(rx));
        while agg.last_health().is_none() {
            tokio::task::yield_now().await;
        }
        tx.send(()).unwrap();

        assert_eq!(handle.await.unwrap(), Some(HealthStatus::Healthy));
    }

    #[tokio::test]
    async fn disabled_monitor_returns_immediately() {
        let (_tx, rx) = broadcast::channel(1);
        let config = HealthConfig {
            monitor_enabled: false,
            ..HealthConfig::default()
        };
        assert_eq!(HealthMonitor::new(aggregator(&[]), config).run(rx).await, None);
    }
}
