//! Admin HTTP surface.
//!
//! # Routes
//! - `GET /health`: full `SystemHealth` report
//! - `GET /health/live`: liveness probe
//! - `GET /health/ready`: readiness probe
//! - `GET /health/connection`: raw connection verdict
//! - `GET /admin/status`: runtime summary
//!
//! Unhealthy results are served with 503 so orchestrators can act on the
//! status code alone; degraded still answers 200.

pub mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::handlers::*;
use crate::runtime::WorkerRuntime;

pub type AdminState = Arc<WorkerRuntime>;

pub fn setup_admin_router(runtime: AdminState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/health/live", get(get_liveness))
        .route("/health/ready", get(get_readiness))
        .route("/health/connection", get(get_connection))
        .route("/admin/status", get(get_status))
        .with_state(runtime)
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin router until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, runtime: AdminState, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin server starting");

    axum::serve(listener, setup_admin_router(runtime))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Admin server stopped");
    Ok(())
}
