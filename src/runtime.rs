//! Worker runtime facade.
//!
//! Wires the connection manager, diagnostics, aggregator and shutdown
//! coordinator together and exposes the operations hosts call.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::WorkerConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::health::{
    ConnectionCheck, ConnectionHealthInfo, DiagnosticsPolicy, FunctionRegistrationCheck, HealthAggregator,
    HealthCheck, HealthCheckResult, HealthDiagnostics, HealthMonitor, MemoryCheck, MemoryPolicy, MemoryProbe,
    ReportInfo, SysinfoMemoryProbe, SystemHealth,
};
use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownOutcome};
use crate::registry::FunctionRegistry;
use crate::transport::{Transport, TransportError};

pub struct WorkerRuntime {
    config: WorkerConfig,
    manager: Arc<ConnectionManager>,
    diagnostics: Arc<HealthDiagnostics>,
    aggregator: Arc<HealthAggregator>,
    coordinator: ShutdownCoordinator,
    registry: Arc<dyn FunctionRegistry>,
}

impl WorkerRuntime {
    /// Build a runtime that samples memory from the current process.
    pub fn new(config: WorkerConfig, transport: Arc<dyn Transport>, registry: Arc<dyn FunctionRegistry>) -> Self {
        Self::with_memory_probe(config, transport, registry, Arc::new(SysinfoMemoryProbe::new()))
    }

    pub fn with_memory_probe(
        config: WorkerConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<dyn FunctionRegistry>,
        memory_probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        let manager = Arc::new(ConnectionManager::new(config.mode, config.connection.clone(), transport));
        let diagnostics = Arc::new(HealthDiagnostics::new(DiagnosticsPolicy::from(&config.health)));

        let checks: Vec<Arc<dyn HealthCheck>> = vec![
            Arc::new(ConnectionCheck::new(manager.clone(), diagnostics.clone())),
            Arc::new(FunctionRegistrationCheck::new(registry.clone())),
            Arc::new(MemoryCheck::new(memory_probe, MemoryPolicy::from(&config.health))),
        ];
        let aggregator = Arc::new(HealthAggregator::new(
            manager.clone(),
            diagnostics.clone(),
            checks,
            ReportInfo::new(config.environment.clone()),
        ));
        let coordinator = ShutdownCoordinator::new(manager.clone(), config.connection.shutdown_timeout());

        Self {
            config,
            manager,
            diagnostics,
            aggregator,
            coordinator,
            registry,
        }
    }

    pub async fn establish_connection(&self) -> Result<(), TransportError> {
        self.manager.establish().await
    }

    /// Gracefully close the connection. Never fails.
    pub async fn shutdown(&self, reason: &str) -> ShutdownOutcome {
        let outcome = self.coordinator.shutdown(reason).await;
        tracing::info!(reason, outcome = %outcome, "Worker shutdown finished");
        outcome
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Coarse connectivity; prefer [`Self::connection_health`] for decisions.
    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn connection_health(&self) -> ConnectionHealthInfo {
        self.diagnostics.inspect(&self.manager)
    }

    pub async fn check_health(&self) -> Arc<SystemHealth> {
        self.aggregator.check_health().await
    }

    pub fn liveness(&self) -> HealthCheckResult {
        self.aggregator.liveness()
    }

    pub fn readiness(&self) -> HealthCheckResult {
        self.aggregator.readiness()
    }

    /// A periodic monitor bound to this runtime's shutdown broadcast.
    pub fn monitor(&self) -> (HealthMonitor, broadcast::Receiver<()>) {
        (
            HealthMonitor::new(self.aggregator.clone(), self.config.health.clone()),
            self.coordinator.subscribe(),
        )
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.coordinator.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.coordinator.is_in_progress()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn aggregator(&self) -> &Arc<HealthAggregator> {
        &self.aggregator
    }

    pub fn diagnostics(&self) -> &Arc<HealthDiagnostics> {
        &self.diagnostics
    }

    pub fn coordinator(&self) -> &ShutdownCoordinator {
        &self.coordinator
    }

    pub fn registry(&self) -> &Arc<dyn FunctionRegistry> {
        &self.registry
    }
}
