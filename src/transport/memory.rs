//! In-process transport with scriptable connections.
//!
//! # Responsibilities
//! - Hand out connections without any network I/O
//! - Let tests and local setups drive every field the diagnostics read
//! - Simulate slow or stuck graceful closes
//!
//! # Design Decisions
//! - Connection fields are plain probes behind a mutex, set directly by callers
//! - `closed()` is backed by a watch channel so any number of waiters resolve

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use tokio::sync::watch;

use crate::connection::ConnectionState;
use crate::transport::{
    ConnectOptions, Probe, Transport, TransportError, TransportReadyState, WorkerConnection,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a [`MemoryConnection`] reacts to `close()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseBehavior {
    /// Close completes immediately.
    #[default]
    Graceful,
    /// The connection moves to CLOSING and only finishes when aborted.
    Hang,
}

/// Field values reported by a [`MemoryConnection`].
#[derive(Debug, Clone)]
pub struct ConnectionFields {
    pub connection_id: Probe<String>,
    pub state: ConnectionState,
    pub ready_state: Probe<u8>,
    pub pending_heartbeats: Probe<u32>,
}

/// A connection whose observable fields are set by the caller.
#[derive(Debug)]
pub struct MemoryConnection {
    id: String,
    options: ConnectOptions,
    fields: Mutex<ConnectionFields>,
    close_behavior: Mutex<CloseBehavior>,
    close_calls: AtomicUsize,
    abort_calls: AtomicUsize,
    closed_tx: watch::Sender<bool>,
}

impl MemoryConnection {
    /// An open, active connection with no missed heartbeats.
    pub fn open(id: impl Into<String>) -> Self {
        Self::with_options(id, ConnectOptions::default())
    }

    fn with_options(id: impl Into<String>, options: ConnectOptions) -> Self {
        let id = id.into();
        let (closed_tx, _) = watch::channel(false);
        Self {
            fields: Mutex::new(ConnectionFields {
                connection_id: Probe::Present(id.clone()),
                state: ConnectionState::Active,
                ready_state: Probe::Present(TransportReadyState::Open.as_raw()),
                pending_heartbeats: Probe::Present(0),
            }),
            id,
            options,
            close_behavior: Mutex::new(CloseBehavior::default()),
            close_calls: AtomicUsize::new(0),
            abort_calls: AtomicUsize::new(0),
            closed_tx,
        }
    }

    /// The id this connection was created with.
    pub fn id(&self) -> String {
        self.id.clone()
    }

    /// Options passed to `connect()`.
    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Mutate several fields at once.
    pub fn update(&self, f: impl FnOnce(&mut ConnectionFields)) {
        f(&mut lock(&self.fields));
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.update(|fields| fields.state = state);
    }

    pub fn set_connection_id(&self, connection_id: Probe<String>) {
        self.update(|fields| fields.connection_id = connection_id);
    }

    pub fn set_ready_state(&self, ready_state: Probe<u8>) {
        self.update(|fields| fields.ready_state = ready_state);
    }

    pub fn set_pending_heartbeats(&self, pending: Probe<u32>) {
        self.update(|fields| fields.pending_heartbeats = pending);
    }

    pub fn set_close_behavior(&self, behavior: CloseBehavior) {
        *lock(&self.close_behavior) = behavior;
    }

    /// Number of times `close()` was requested.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Number of times `abort()` was requested.
    pub fn abort_calls(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }

    /// Finish the connection as if the remote side closed it.
    pub fn finish(&self) {
        self.update(|fields| {
            fields.state = ConnectionState::Closed;
            fields.ready_state = Probe::Present(TransportReadyState::Closed.as_raw());
        });
        self.closed_tx.send_replace(true);
    }
}

impl WorkerConnection for MemoryConnection {
    fn connection_id(&self) -> Probe<String> {
        lock(&self.fields).connection_id.clone()
    }

    fn state(&self) -> ConnectionState {
        lock(&self.fields).state
    }

    fn ready_state(&self) -> Probe<u8> {
        lock(&self.fields).ready_state.clone()
    }

    fn pending_heartbeats(&self) -> Probe<u32> {
        lock(&self.fields).pending_heartbeats.clone()
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        match *lock(&self.close_behavior) {
            CloseBehavior::Graceful => self.finish(),
            CloseBehavior::Hang => self.update(|fields| {
                fields.state = ConnectionState::Closing;
                fields.ready_state = Probe::Present(TransportReadyState::Closing.as_raw());
            }),
        }
    }

    fn abort(&self) {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        self.finish();
    }

    fn closed(&self) -> BoxFuture<'_, ()> {
        let mut rx = self.closed_tx.subscribe();
        Box::pin(async move {
            // Sender lives as long as `self`, so this only ends once closed.
            let _ = rx.wait_for(|closed| *closed).await;
        })
    }
}

/// Transport that creates [`MemoryConnection`]s.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    connect_calls: AtomicUsize,
    failure: Mutex<Option<String>>,
    close_behavior: Mutex<CloseBehavior>,
    last: Mutex<Option<Arc<MemoryConnection>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `connect()` fail with a rejection.
    pub fn fail_next(&self, reason: impl Into<String>) {
        *lock(&self.failure) = Some(reason.into());
    }

    /// Close behavior applied to connections created from now on.
    pub fn set_close_behavior(&self, behavior: CloseBehavior) {
        *lock(&self.close_behavior) = behavior;
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// The most recently created connection.
    pub fn last_connection(&self) -> Option<Arc<MemoryConnection>> {
        lock(&self.last).clone()
    }
}

impl Transport for MemoryTransport {
    fn connect(
        &self,
        options: ConnectOptions,
    ) -> BoxFuture<'_, Result<Arc<dyn WorkerConnection>, TransportError>> {
        Box::pin(async move {
            let attempt = self.connect_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(reason) = lock(&self.failure).take() {
                return Err(TransportError::Rejected(reason));
            }

            let id = format!("mem-{attempt}");
            let connection = Arc::new(MemoryConnection::with_options(id, options));
            connection.set_close_behavior(*lock(&self.close_behavior));
            *lock(&self.last) = Some(connection.clone());
            Ok(connection as Arc<dyn WorkerConnection>)
        })
    }
}
