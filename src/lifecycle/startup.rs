//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize logging and metrics from configuration
//! - Build the runtime and open the worker connection
//! - Start background tasks (health monitor, admin server)
//! - Wait for a shutdown signal and tear down through the coordinator
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Admin listener starts last (probes only answer once connected)

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin;
use crate::config::{ConnectionMode, WorkerConfig};
use crate::observability::{logging, metrics};
use crate::registry::InMemoryFunctionRegistry;
use crate::runtime::WorkerRuntime;
use crate::transport::memory::MemoryTransport;
use crate::transport::ws::WsTransport;
use crate::transport::{Transport, TransportError};

use super::signals::shutdown_signal;
use super::ShutdownOutcome;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid {field} '{value}'")]
    Address { field: &'static str, value: String },

    #[error("failed to bind admin listener on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to dispatcher: {0}")]
    Connect(#[from] TransportError),
}

fn parse_address(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::Address {
        field,
        value: value.to_string(),
    })
}

fn build_transport(config: &WorkerConfig) -> Result<Arc<dyn Transport>, StartupError> {
    match config.mode {
        ConnectionMode::Connect => Ok(Arc::new(WsTransport::new(
            &config.connection.url,
            config.connection.heartbeat_interval(),
        )?)),
        // Never asked to connect.
        ConnectionMode::Connectionless => Ok(Arc::new(MemoryTransport::new())),
    }
}

/// Run the worker until a shutdown signal arrives.
pub async fn run(config: WorkerConfig) -> Result<ShutdownOutcome, StartupError> {
    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?config.mode,
        environment = %config.environment,
        functions = config.functions.len(),
        "worker-link starting"
    );

    if config.observability.metrics_enabled {
        let addr = parse_address("observability.metrics_address", &config.observability.metrics_address)?;
        metrics::init_metrics(addr);
    }

    let transport = build_transport(&config)?;
    let registry = Arc::new(InMemoryFunctionRegistry::with_functions(config.functions.iter().cloned()));
    let runtime = Arc::new(WorkerRuntime::new(config, transport, registry));

    runtime.establish_connection().await?;

    let (monitor, monitor_shutdown) = runtime.monitor();
    let monitor_task = tokio::spawn(monitor.run(monitor_shutdown));

    let admin_task = if runtime.config().admin.enabled {
        let address = parse_address("admin.bind_address", &runtime.config().admin.bind_address)?;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| StartupError::Bind { address, source })?;
        let mut stop = runtime.subscribe_shutdown();
        let server = admin::serve(listener, runtime.clone(), async move {
            let _ = stop.recv().await;
        });
        Some(tokio::spawn(server))
    } else {
        tracing::info!("Admin server disabled");
        None
    };

    let signal = shutdown_signal().await;
    let outcome = runtime.shutdown(signal).await;

    if let Err(e) = monitor_task.await {
        tracing::error!(error = %e, "Health monitor task failed");
    }
    if let Some(task) = admin_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Admin server error"),
            Err(e) => tracing::error!(error = %e, "Admin server task failed"),
        }
    }

    tracing::info!(outcome = %outcome, "Shutdown complete");
    Ok(outcome)
}
