//! Shutdown coordination for the worker.
//!
//! # Data Flow
//! ```text
//! shutdown(reason)
//!     connectionless / already running / no connection → return
//!     → broadcast to background tasks
//!     → connection.close()
//!     → race closed() against the deadline; abort on timeout
//!     → clear the connection slot (always)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::connection::ConnectionManager;
use crate::observability::metrics;

/// Broadcast signal for long-running tasks.
///
/// All background tasks subscribe and exit once it fires.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// What a shutdown call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Connectionless mode, nothing to close.
    NotApplicable,
    /// No connection was held.
    NoConnection,
    /// Another shutdown is already running.
    AlreadyInProgress,
    /// The connection closed before the deadline.
    Graceful,
    /// The deadline passed first; the connection was aborted and dropped.
    TimedOut,
}

impl ShutdownOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownOutcome::NotApplicable => "not_applicable",
            ShutdownOutcome::NoConnection => "no_connection",
            ShutdownOutcome::AlreadyInProgress => "already_in_progress",
            ShutdownOutcome::Graceful => "graceful",
            ShutdownOutcome::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for ShutdownOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-flight graceful shutdown of the worker connection.
pub struct ShutdownCoordinator {
    manager: Arc<ConnectionManager>,
    timeout: Duration,
    in_progress: AtomicBool,
    notifier: Shutdown,
}

/// Clears the connection slot and releases the in-progress flag.
struct ShutdownGuard<'a> {
    coordinator: &'a ShutdownCoordinator,
}

impl Drop for ShutdownGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.manager.clear();
        self.coordinator.in_progress.store(false, Ordering::SeqCst);
    }
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<ConnectionManager>, timeout: Duration) -> Self {
        Self {
            manager,
            timeout,
            in_progress: AtomicBool::new(false),
            notifier: Shutdown::new(),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Subscribe to the shutdown broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notifier.subscribe()
    }

    /// Shut down with the configured deadline.
    pub async fn shutdown(&self, reason: &str) -> ShutdownOutcome {
        self.shutdown_with_timeout(reason, self.timeout).await
    }

    /// Close the connection, waiting at most `timeout`. Never fails.
    pub async fn shutdown_with_timeout(&self, reason: &str, timeout: Duration) -> ShutdownOutcome {
        let outcome = self.run(reason, timeout).await;
        metrics::record_shutdown(outcome.as_str());
        outcome
    }

    async fn run(&self, reason: &str, timeout: Duration) -> ShutdownOutcome {
        if self.manager.is_connectionless() {
            tracing::debug!(reason, "Connectionless mode, nothing to shut down");
            self.notifier.trigger();
            return ShutdownOutcome::NotApplicable;
        }

        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(reason, "Shutdown already in progress");
            return ShutdownOutcome::AlreadyInProgress;
        }
        let _guard = ShutdownGuard { coordinator: self };
        self.notifier.trigger();

        let Some(active) = self.manager.current() else {
            tracing::debug!(reason, "No worker connection to close");
            return ShutdownOutcome::NoConnection;
        };

        tracing::info!(
            reason,
            timeout_ms = timeout.as_millis() as u64,
            "Closing worker connection"
        );

        let connection = active.connection();
        connection.close();

        tokio::select! {
            _ = connection.closed() => {
                tracing::info!(reason, "Worker connection closed");
                ShutdownOutcome::Graceful
            }
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(
                    reason,
                    timeout_ms = timeout.as_millis() as u64,
                    "Worker connection did not complete gracefully within the timeout"
                );
                connection.abort();
                ShutdownOutcome::TimedOut
            }
        }
    }
}
