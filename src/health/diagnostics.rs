//! Tiered connection diagnostics.
//!
//! # Inspection Order
//! ```text
//! 1. connectionless mode        → healthy, NOT_APPLICABLE
//! 2. connection / id present?   → no:  unhealthy (deep)
//! 3. ready-state present?       → no:  coarse state only (shallow)
//! 4. ready-state == OPEN?       → no:  unhealthy, named transport state (deep)
//! 5. heartbeats < threshold?    → no:  unhealthy, heartbeat failure (deep)
//! 6. coarse state == ACTIVE?    → no:  unhealthy, named coarse state (deep)
//! 7.                            → healthy (deep)
//!
//! Unreadable probe or panic in steps 2-6 → coarse state only, warned once
//! Unreadable coarse state                 → unhealthy as CLOSED, warned once
//! ```
//!
//! # Design Decisions
//! - Cheap, certain signals first; the coarse state is the last tie-breaker
//! - Pure reads against resident state: no I/O, no awaiting
//! - The warn-once flag lives on the instance and is never reset. A reset hook
//!   would belong here if hosts ever need to re-arm the warning.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::HealthConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::health::types::ConnectionHealthInfo;
use crate::observability::metrics;
use crate::transport::probe::panic_reason;
use crate::transport::{Probe, ProbeError, TransportReadyState, WorkerConnection};

/// Tunable thresholds for the inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsPolicy {
    /// Missed heartbeats at which the connection counts as failed.
    pub heartbeat_failure_threshold: u32,
}

impl Default for DiagnosticsPolicy {
    fn default() -> Self {
        Self {
            heartbeat_failure_threshold: 2,
        }
    }
}

impl From<&HealthConfig> for DiagnosticsPolicy {
    fn from(config: &HealthConfig) -> Self {
        Self {
            heartbeat_failure_threshold: config.heartbeat_failure_threshold,
        }
    }
}

/// Produces authoritative connection verdicts.
#[derive(Debug, Default)]
pub struct HealthDiagnostics {
    policy: DiagnosticsPolicy,
    fallback_warned: AtomicBool,
}

/// Fields gathered so far, carried into whichever verdict is reached.
struct Observed {
    sdk_state: ConnectionState,
    connection_id: Option<String>,
    ready_state: Option<u8>,
    pending_heartbeats: Option<u32>,
}

impl Observed {
    fn new(sdk_state: ConnectionState) -> Self {
        Self {
            sdk_state,
            connection_id: None,
            ready_state: None,
            pending_heartbeats: None,
        }
    }

    fn verdict(self, is_healthy: bool, reason: String, using_deep_check: bool) -> ConnectionHealthInfo {
        ConnectionHealthInfo {
            is_healthy,
            reason,
            sdk_state: self.sdk_state,
            transport_ready_state: self.ready_state,
            transport_state_name: self.ready_state.map(|raw| ready_state_name(raw).to_string()),
            pending_heartbeats: self.pending_heartbeats,
            connection_id: self.connection_id,
            using_deep_check,
        }
    }
}

fn ready_state_name(raw: u8) -> &'static str {
    TransportReadyState::from_raw(raw).map_or("UNKNOWN", TransportReadyState::name)
}

impl HealthDiagnostics {
    pub fn new(policy: DiagnosticsPolicy) -> Self {
        Self {
            policy,
            fallback_warned: AtomicBool::new(false),
        }
    }

    /// Whether the one-time fallback warning has been emitted.
    pub fn fallback_warned(&self) -> bool {
        self.fallback_warned.load(Ordering::Relaxed)
    }

    /// Inspect the manager's connection and return a fresh verdict.
    pub fn inspect(&self, manager: &ConnectionManager) -> ConnectionHealthInfo {
        if manager.is_connectionless() {
            return Observed::new(ConnectionState::NotApplicable).verdict(
                true,
                "Connectionless mode; no persistent connection".to_string(),
                false,
            );
        }

        let Some(active) = manager.current() else {
            return Observed::new(ConnectionState::Closed).verdict(
                false,
                "No active connection (currentConnection is null)".to_string(),
                true,
            );
        };

        let sdk_state = match active.state().into_result() {
            Ok(state) => state.unwrap_or(ConnectionState::Closed),
            Err(err) => return self.fallback(ConnectionState::Closed, &err.to_string()),
        };

        let inspected = panic::catch_unwind(AssertUnwindSafe(|| {
            self.inspect_connection(active.connection(), sdk_state)
        }));
        match inspected {
            Ok(Ok(info)) => info,
            Ok(Err(err)) => self.fallback(sdk_state, &err.to_string()),
            Err(payload) => self.fallback(sdk_state, &panic_reason(payload.as_ref())),
        }
    }

    fn inspect_connection(
        &self,
        connection: &dyn WorkerConnection,
        sdk_state: ConnectionState,
    ) -> Result<ConnectionHealthInfo, ProbeError> {
        let mut observed = Observed::new(sdk_state);

        match connection.connection_id() {
            Probe::Present(id) => observed.connection_id = Some(id),
            Probe::Absent => {
                return Ok(observed.verdict(
                    false,
                    "No active connection (connection id is not set)".to_string(),
                    true,
                ));
            }
            Probe::Unreadable(err) => {
                return Ok(observed.verdict(false, format!("No active connection ({err})"), true));
            }
        }

        let Some(raw) = connection.ready_state().into_result()? else {
            let healthy = sdk_state == ConnectionState::Active;
            return Ok(observed.verdict(
                healthy,
                format!("Transport state not accessible; SDK state is {sdk_state}"),
                false,
            ));
        };
        observed.ready_state = Some(raw);

        if raw != TransportReadyState::Open.as_raw() {
            observed.pending_heartbeats = connection.pending_heartbeats().present();
            return Ok(observed.verdict(
                false,
                format!("Transport is {}", ready_state_name(raw)),
                true,
            ));
        }

        let pending = connection.pending_heartbeats().into_result()?;
        observed.pending_heartbeats = pending;
        if let Some(missed) = pending {
            if missed >= self.policy.heartbeat_failure_threshold {
                return Ok(observed.verdict(
                    false,
                    format!("Heartbeat failure ({missed} consecutive missed)"),
                    true,
                ));
            }
        }

        if sdk_state != ConnectionState::Active {
            return Ok(observed.verdict(
                false,
                format!("SDK state is {sdk_state} while transport is OPEN"),
                true,
            ));
        }

        Ok(observed.verdict(true, "Connection active (transport OPEN)".to_string(), true))
    }

    fn fallback(&self, sdk_state: ConnectionState, detail: &str) -> ConnectionHealthInfo {
        metrics::record_diagnostics_fallback();
        if !self.fallback_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                error = %detail,
                sdk_state = %sdk_state,
                "Deep connection inspection failed; falling back to SDK state (further failures are not logged)"
            );
        }

        Observed::new(sdk_state).verdict(
            sdk_state == ConnectionState::Active,
            format!("Deep inspection unavailable ({detail}); SDK state is {sdk_state}"),
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, ConnectionMode};
    use crate::transport::memory::{MemoryConnection, MemoryTransport};
    use crate::transport::{ConnectOptions, Transport, TransportError};
    use futures_util::future::BoxFuture;
    use std::io;
    use std::sync::{Arc, Mutex};

    async fn connected() -> (ConnectionManager, Arc<MemoryConnection>) {
        let transport = Arc::new(MemoryTransport::new());
        let manager = ConnectionManager::new(
            ConnectionMode::Connect,
            ConnectionConfig::default(),
            transport.clone(),
        );
        manager.establish().await.unwrap();
        let connection = transport.last_connection().unwrap();
        (manager, connection)
    }

    #[tokio::test]
    async fn connectionless_is_always_healthy() {
        let manager = ConnectionManager::new(
            ConnectionMode::Connectionless,
            ConnectionConfig::default(),
            Arc::new(MemoryTransport::new()),
        );
        let info = HealthDiagnostics::default().inspect(&manager);
        assert!(info.is_healthy);
        assert_eq!(info.sdk_state, ConnectionState::NotApplicable);
        assert!(!info.using_deep_check);
    }

    #[tokio::test]
    async fn missing_connection_is_unhealthy() {
        let manager = ConnectionManager::new(
            ConnectionMode::Connect,
            ConnectionConfig::default(),
            Arc::new(MemoryTransport::new()),
        );
        let info = HealthDiagnostics::default().inspect(&manager);
        assert!(!info.is_healthy);
        assert!(info.reason.contains("currentConnection is null"));
        assert!(info.using_deep_check);
        assert_eq!(info.sdk_state, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn unreadable_connection_id_counts_as_absent() {
        let (manager, connection) = connected().await;
        connection.set_connection_id(Probe::unreadable("id", "connection torn down"));

        let diagnostics = HealthDiagnostics::default();
        let info = diagnostics.inspect(&manager);
        assert!(!info.is_healthy);
        assert!(info.reason.starts_with("No active connection"));
        assert!(info.using_deep_check);
        assert!(!diagnostics.fallback_warned());
    }

    #[tokio::test]
    async fn open_active_connection_is_healthy() {
        let (manager, connection) = connected().await;
        let info = HealthDiagnostics::default().inspect(&manager);

        assert!(info.is_healthy);
        assert!(info.using_deep_check);
        assert_eq!(info.transport_ready_state, Some(1));
        assert_eq!(info.transport_state_name.as_deref(), Some("OPEN"));
        assert_eq!(info.pending_heartbeats, Some(0));
        assert_eq!(info.connection_id, Some(connection.id()));
    }

    #[tokio::test]
    async fn closed_transport_is_unhealthy_even_when_active() {
        let (manager, connection) = connected().await;
        connection.set_ready_state(Probe::Present(3));

        let info = HealthDiagnostics::default().inspect(&manager);
        assert!(!info.is_healthy);
        assert_eq!(info.sdk_state, ConnectionState::Active);
        assert_eq!(info.transport_state_name.as_deref(), Some("CLOSED"));
        assert_eq!(info.reason, "Transport is CLOSED");
        assert!(info.using_deep_check);
    }

    #[tokio::test]
    async fn connecting_and_closing_transport_are_named() {
        let (manager, connection) = connected().await;
        let diagnostics = HealthDiagnostics::default();

        connection.set_ready_state(Probe::Present(0));
        assert!(diagnostics.inspect(&manager).reason.contains("CONNECTING"));

        connection.set_ready_state(Probe::Present(2));
        let info = diagnostics.inspect(&manager);
        assert!(info.reason.contains("CLOSING"));
        assert!(!info.is_healthy);
    }

    #[tokio::test]
    async fn heartbeat_threshold_boundary() {
        let (manager, connection) = connected().await;
        let diagnostics = HealthDiagnostics::default();

        connection.set_pending_heartbeats(Probe::Present(1));
        let info = diagnostics.inspect(&manager);
        assert!(info.is_healthy);
        assert_eq!(info.pending_heartbeats, Some(1));

        connection.set_pending_heartbeats(Probe::Present(2));
        let info = diagnostics.inspect(&manager);
        assert!(!info.is_healthy);
        assert!(info.reason.contains("Heartbeat failure"));
        assert!(info.reason.contains("2 consecutive missed"));
        assert!(info.using_deep_check);
    }

    #[tokio::test]
    async fn heartbeat_threshold_is_configurable() {
        let (manager, connection) = connected().await;
        let diagnostics = HealthDiagnostics::new(DiagnosticsPolicy {
            heartbeat_failure_threshold: 4,
        });

        connection.set_pending_heartbeats(Probe::Present(3));
        assert!(diagnostics.inspect(&manager).is_healthy);
        connection.set_pending_heartbeats(Probe::Present(4));
        assert!(!diagnostics.inspect(&manager).is_healthy);
    }

    #[tokio::test]
    async fn missing_heartbeat_counter_is_tolerated() {
        let (manager, connection) = connected().await;
        connection.set_pending_heartbeats(Probe::Absent);

        let info = HealthDiagnostics::default().inspect(&manager);
        assert!(info.is_healthy);
        assert_eq!(info.pending_heartbeats, None);
        assert!(info.using_deep_check);
    }

    #[tokio::test]
    async fn coarse_state_breaks_the_tie() {
        let (manager, connection) = connected().await;
        connection.set_state(ConnectionState::Closing);

        let info = HealthDiagnostics::default().inspect(&manager);
        assert!(!info.is_healthy);
        assert!(info.reason.contains("CLOSING"));
        assert!(info.using_deep_check);
    }

    #[tokio::test]
    async fn inaccessible_ready_state_uses_coarse_state() {
        let (manager, connection) = connected().await;
        connection.set_ready_state(Probe::Absent);
        let diagnostics = HealthDiagnostics::default();

        let info = diagnostics.inspect(&manager);
        assert!(info.is_healthy);
        assert!(!info.using_deep_check);
        assert!(info.reason.contains("not accessible"));

        connection.set_state(ConnectionState::Reconnecting);
        let info = diagnostics.inspect(&manager);
        assert!(!info.is_healthy);
        assert!(!info.using_deep_check);
        assert!(!diagnostics.fallback_warned());
    }

    #[tokio::test]
    async fn repeated_inspection_is_stable() {
        let (manager, connection) = connected().await;
        connection.set_pending_heartbeats(Probe::Present(1));
        let diagnostics = HealthDiagnostics::default();

        let first = diagnostics.inspect(&manager);
        let second = diagnostics.inspect(&manager);
        let third = diagnostics.inspect(&manager);
        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn count(&self, needle: &str) -> usize {
            String::from_utf8_lossy(&self.0.lock().unwrap()).matches(needle).count()
        }
    }

    #[tokio::test]
    async fn unreadable_transport_warns_once() {
        let (manager, connection) = connected().await;
        connection.set_ready_state(Probe::unreadable("ready_state", "internal shape changed"));
        connection.set_pending_heartbeats(Probe::unreadable("pending_heartbeats", "internal shape changed"));

        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let diagnostics = HealthDiagnostics::default();
        let verdicts: Vec<_> = tracing::subscriber::with_default(subscriber, || {
            (0..3).map(|_| diagnostics.inspect(&manager)).collect()
        });

        assert_eq!(logs.count("Deep connection inspection failed"), 1);
        assert!(diagnostics.fallback_warned());
        for info in verdicts {
            assert!(info.is_healthy, "ACTIVE coarse state keeps the fallback healthy");
            assert!(!info.using_deep_check);
            assert!(info.reason.contains("internal shape changed"));
        }
    }

    struct PanickingConnection;

    impl WorkerConnection for PanickingConnection {
        fn connection_id(&self) -> Probe<String> {
            Probe::Present("p-1".into())
        }
        fn state(&self) -> ConnectionState {
            ConnectionState::Reconnecting
        }
        fn ready_state(&self) -> Probe<u8> {
            panic!("ready_state accessor exploded")
        }
        fn pending_heartbeats(&self) -> Probe<u32> {
            Probe::Absent
        }
        fn close(&self) {}
        fn abort(&self) {}
        fn closed(&self) -> BoxFuture<'_, ()> {
            Box::pin(async {})
        }
    }

    /// Open socket whose coarse state accessor panics.
    struct BrokenStateConnection;

    impl WorkerConnection for BrokenStateConnection {
        fn connection_id(&self) -> Probe<String> {
            Probe::Present("b-1".into())
        }
        fn state(&self) -> ConnectionState {
            panic!("state accessor exploded")
        }
        fn ready_state(&self) -> Probe<u8> {
            Probe::Present(TransportReadyState::Open.as_raw())
        }
        fn pending_heartbeats(&self) -> Probe<u32> {
            Probe::Present(0)
        }
        fn close(&self) {}
        fn abort(&self) {}
        fn closed(&self) -> BoxFuture<'_, ()> {
            Box::pin(async {})
        }
    }

    struct FixedTransport(Arc<dyn WorkerConnection>);

    impl Transport for FixedTransport {
        fn connect(
            &self,
            _options: ConnectOptions,
        ) -> BoxFuture<'_, Result<Arc<dyn WorkerConnection>, TransportError>> {
            let connection = self.0.clone();
            Box::pin(async move { Ok(connection) })
        }
    }

    async fn connected_to(connection: Arc<dyn WorkerConnection>) -> ConnectionManager {
        let manager = ConnectionManager::new(
            ConnectionMode::Connect,
            ConnectionConfig::default(),
            Arc::new(FixedTransport(connection)),
        );
        manager.establish().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn panicking_accessor_falls_back_to_coarse_state() {
        let manager = connected_to(Arc::new(PanickingConnection)).await;

        let diagnostics = HealthDiagnostics::default();
        let info = diagnostics.inspect(&manager);
        assert!(!info.is_healthy);
        assert!(!info.using_deep_check);
        assert_eq!(info.sdk_state, ConnectionState::Reconnecting);
        assert!(info.reason.contains("exploded"));
        assert!(diagnostics.fallback_warned());
    }

    #[tokio::test]
    async fn panicking_state_accessor_is_unhealthy_fallback() {
        let manager = connected_to(Arc::new(BrokenStateConnection)).await;

        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(!manager.is_connected());
        assert!(format!("{manager:?}").contains("Closed"));
        assert!(format!("{:?}", manager.current().unwrap()).contains("state accessor exploded"));

        let diagnostics = HealthDiagnostics::default();
        for _ in 0..2 {
            let info = diagnostics.inspect(&manager);
            assert!(!info.is_healthy);
            assert!(!info.using_deep_check);
            assert_eq!(info.sdk_state, ConnectionState::Closed);
            assert!(info.reason.contains("state accessor exploded"));
        }
        assert!(diagnostics.fallback_warned());
    }
}
