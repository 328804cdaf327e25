//! Connection manager: holds the worker connection and its coarse state.
//!
//! # Responsibilities
//! - Open the persistent connection through the configured transport
//! - Hold the single reference to the live connection
//! - Report the coarse state (possibly stale, see `health::diagnostics`)

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;

use crate::config::{ConnectionConfig, ConnectionMode};
use crate::connection::ConnectionState;
use crate::observability::metrics;
use crate::transport::{Probe, Transport, TransportError, WorkerConnection};

/// A connection returned by a successful `establish()`.
pub struct ActiveConnection {
    connection: Arc<dyn WorkerConnection>,
    established_at: Instant,
}

impl ActiveConnection {
    pub fn connection(&self) -> &dyn WorkerConnection {
        self.connection.as_ref()
    }

    /// Coarse state, with a panicking accessor reported as unreadable.
    pub fn state(&self) -> Probe<ConnectionState> {
        Probe::guarded("state", || Probe::Present(self.connection.state()))
    }

    /// Connection id, with a panicking accessor reported as unreadable.
    pub fn connection_id(&self) -> Probe<String> {
        Probe::guarded("connection_id", || self.connection.connection_id())
    }
}

impl std::fmt::Debug for ActiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveConnection")
            .field("connection_id", &self.connection_id())
            .field("state", &self.state())
            .field("uptime_secs", &self.established_at.elapsed().as_secs())
            .finish()
    }
}

/// Owns the worker connection slot.
pub struct ConnectionManager {
    mode: ConnectionMode,
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    current: ArcSwapOption<ActiveConnection>,
}

impl ConnectionManager {
    pub fn new(mode: ConnectionMode, config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            mode,
            config,
            transport,
            current: ArcSwapOption::empty(),
        }
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn is_connectionless(&self) -> bool {
        self.mode == ConnectionMode::Connectionless
    }

    /// Open the worker connection.
    ///
    /// Concurrent calls are not coalesced; callers serialize establishment.
    /// On failure no connection is stored and the error is returned as-is.
    pub async fn establish(&self) -> Result<(), TransportError> {
        if self.is_connectionless() {
            tracing::info!("Connectionless mode, skipping connection establishment");
            return Ok(());
        }

        let options = self.config.connect_options();
        tracing::info!(
            url = %self.config.url,
            instance_id = ?options.instance_id,
            max_concurrency = ?options.max_concurrency,
            "Establishing worker connection"
        );

        let connection = match self.transport.connect(options).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!(error = %e, "Failed to establish worker connection");
                metrics::record_connection_attempt(false);
                return Err(e);
            }
        };

        let active = Arc::new(ActiveConnection {
            connection,
            established_at: Instant::now(),
        });
        let connection_id = active.connection_id().present();
        let previous = self.current.swap(Some(active));
        if previous.is_some() {
            tracing::warn!("Replaced an existing worker connection without closing it");
        }

        metrics::record_connection_attempt(true);
        metrics::record_connection_state(self.state());
        tracing::info!(connection_id = ?connection_id, "Worker connection established");
        Ok(())
    }

    /// Coarse connection state. An unreadable state reports as CLOSED.
    pub fn state(&self) -> ConnectionState {
        if self.is_connectionless() {
            return ConnectionState::NotApplicable;
        }
        match &*self.current.load() {
            Some(active) => active.state().present().unwrap_or(ConnectionState::Closed),
            None => ConnectionState::Closed,
        }
    }

    /// Coarse connectivity signal. Not an authoritative health check.
    pub fn is_connected(&self) -> bool {
        !self.is_connectionless() && self.state() == ConnectionState::Active
    }

    /// Snapshot of the current connection, if any.
    pub fn current(&self) -> Option<Arc<ActiveConnection>> {
        self.current.load_full()
    }

    /// Connection id of the current connection, when readable.
    pub fn connection_id(&self) -> Option<String> {
        let current = self.current.load();
        (*current)
            .as_ref()
            .and_then(|active| active.connection_id().present())
    }

    /// Drop the reference to the current connection.
    pub(crate) fn clear(&self) -> Option<Arc<ActiveConnection>> {
        let previous = self.current.swap(None);
        if previous.is_some() {
            metrics::record_connection_state(ConnectionState::Closed);
        }
        previous
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("mode", &self.mode)
            .field("url", &self.config.url)
            .field("state", &self.state())
            .finish()
    }
}
