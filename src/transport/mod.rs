//! Transport client boundary.
//!
//! # Data Flow
//! ```text
//! ConnectionManager::establish()
//!     → Transport::connect(ConnectOptions)
//!     → Arc<dyn WorkerConnection> (owned and mutated by the transport)
//!
//! Diagnostics (read-only):
//!     WorkerConnection::connection_id()      → Probe<String>
//!     WorkerConnection::ready_state()        → Probe<u8>
//!     WorkerConnection::pending_heartbeats() → Probe<u32>
//! ```
//!
//! # Design Decisions
//! - The engine never mutates connection internals, it only asks to close or abort
//! - Every field read is a [`Probe`], never a panic or a hidden exception
//! - Implementations: WebSocket (ws.rs) and scriptable in-process (memory.rs)

pub mod memory;
pub mod probe;
pub mod ws;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::connection::ConnectionState;

pub use probe::{Probe, ProbeError, TransportReadyState};

/// Options handed to the transport when opening the worker connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Stable identifier for this worker instance.
    pub instance_id: Option<String>,
    /// Maximum concurrent executions the dispatcher may assign.
    pub max_concurrency: Option<u32>,
    /// Whether the transport should install its own signal handlers.
    pub handle_shutdown_signals: bool,
}

/// Errors raised while establishing a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Endpoint URL could not be used.
    #[error("invalid endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// The WebSocket handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    /// The dispatcher refused the connection.
    #[error("connection rejected: {0}")]
    Rejected(String),
}

/// A live worker connection as exposed by the transport client.
pub trait WorkerConnection: Send + Sync {
    /// Connection identifier assigned at connect time.
    fn connection_id(&self) -> Probe<String>;

    /// The transport's self-reported, coarse state.
    fn state(&self) -> ConnectionState;

    /// Raw socket ready-state (see [`TransportReadyState`]).
    fn ready_state(&self) -> Probe<u8>;

    /// Consecutive liveness probes sent without an answer.
    fn pending_heartbeats(&self) -> Probe<u32>;

    /// Request a graceful close. Returns immediately.
    fn close(&self);

    /// Tear the connection down without waiting for the peer. Returns immediately.
    fn abort(&self);

    /// Resolves once the connection has fully closed.
    fn closed(&self) -> BoxFuture<'_, ()>;
}

/// Opens worker connections.
pub trait Transport: Send + Sync {
    fn connect(
        &self,
        options: ConnectOptions,
    ) -> BoxFuture<'_, Result<Arc<dyn WorkerConnection>, TransportError>>;
}
