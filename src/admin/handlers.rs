use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::config::ConnectionMode;
use crate::connection::ConnectionState;
use crate::health::{ConnectionHealthInfo, HealthCheckResult, HealthStatus, SystemHealth};

#[derive(Debug, Serialize)]
pub struct WorkerStatus {
    pub version: &'static str,
    pub environment: String,
    pub mode: ConnectionMode,
    pub connection_state: ConnectionState,
    pub connection_id: Option<String>,
    pub connected: bool,
    pub shutting_down: bool,
    pub registered_functions: Vec<String>,
    pub last_overall: Option<HealthStatus>,
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    }
}

pub async fn get_health(State(runtime): State<AdminState>) -> (StatusCode, Json<SystemHealth>) {
    let health = runtime.check_health().await;
    (status_code(health.overall), Json(SystemHealth::clone(&health)))
}

pub async fn get_liveness(State(runtime): State<AdminState>) -> (StatusCode, Json<HealthCheckResult>) {
    let result = runtime.liveness();
    (status_code(result.status), Json(result))
}

pub async fn get_readiness(State(runtime): State<AdminState>) -> (StatusCode, Json<HealthCheckResult>) {
    let result = runtime.readiness();
    (status_code(result.status), Json(result))
}

pub async fn get_connection(State(runtime): State<AdminState>) -> (StatusCode, Json<ConnectionHealthInfo>) {
    let info = runtime.connection_health();
    let code = if info.is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(info))
}

pub async fn get_status(State(runtime): State<AdminState>) -> Json<WorkerStatus> {
    let config = runtime.config();
    Json(WorkerStatus {
        version: env!("CARGO_PKG_VERSION"),
        environment: config.environment.clone(),
        mode: config.mode,
        connection_state: runtime.connection_state(),
        connection_id: runtime.manager().connection_id(),
        connected: runtime.is_connected(),
        shutting_down: runtime.is_shutting_down(),
        registered_functions: runtime.registry().function_ids(),
        last_overall: runtime.aggregator().last_health().map(|health| health.overall),
    })
}
