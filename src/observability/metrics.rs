//! Metrics collection and exposition.
//!
//! # Metrics
//! - `worker_connection_attempts_total` (counter): establish attempts by outcome
//! - `worker_connection_state` (gauge): coarse state as its numeric code
//! - `worker_health_status` (gauge): 0=healthy, 1=degraded, 2=unhealthy, per check
//! - `worker_health_check_duration_seconds` (histogram): per check latency
//! - `worker_diagnostics_fallback_total` (counter): deep inspection fallbacks
//! - `worker_shutdown_total` (counter): shutdown outcomes

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::connection::ConnectionState;
use crate::health::HealthStatus;

/// Install the Prometheus exporter on `addr`. Needs a running Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_attempt(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("worker_connection_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_connection_state(state: ConnectionState) {
    metrics::gauge!("worker_connection_state").set(f64::from(state as u8));
}

pub fn record_check(check: &str, status: HealthStatus, elapsed: Duration) {
    let code = match status {
        HealthStatus::Healthy => 0.0,
        HealthStatus::Degraded => 1.0,
        HealthStatus::Unhealthy => 2.0,
    };
    metrics::gauge!("worker_health_status", "check" => check.to_string()).set(code);
    metrics::histogram!("worker_health_check_duration_seconds", "check" => check.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_diagnostics_fallback() {
    metrics::counter!("worker_diagnostics_fallback_total").increment(1);
}

pub fn record_shutdown(outcome: &'static str) {
    metrics::counter!("worker_shutdown_total", "outcome" => outcome).increment(1);
}
