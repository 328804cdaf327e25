//! WebSocket transport.
//!
//! # Responsibilities
//! - Open the worker socket to the dispatcher endpoint
//! - Track socket ready-state and coarse state in atomics
//! - Send liveness pings and count the ones left unanswered
//! - Close with a close frame on request and signal completion
//!
//! # Data Flow
//! ```text
//! connect_async(url?instance_id=..&max_concurrency=..)
//!     → spawn driver task
//!         ticker      → pending_heartbeats += 1, send Ping
//!         Pong        → pending_heartbeats = 0
//!         close()     → CLOSING, send Close frame, arm close deadline
//!         deadline    → drop the socket
//!         abort()     → drop the socket
//!         stream end  → CLOSED, closed() resolves
//! ```
//!
//! # Design Decisions
//! - Message dispatch is not handled here; data frames are only logged
//! - No reconnection: a dropped socket stays CLOSED until re-established
//! - The driver owns the socket; every exit path ends in CLOSED and drops it

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{watch, Notify};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::connection::ConnectionState;
use crate::transport::{
    ConnectOptions, Probe, Transport, TransportError, TransportReadyState, WorkerConnection,
};

/// Transport that connects to the dispatcher over WebSocket.
#[derive(Debug, Clone)]
pub struct WsTransport {
    endpoint: Url,
    heartbeat_interval: Duration,
    close_timeout: Duration,
}

/// How long a closing socket waits for the peer's close frame.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

impl WsTransport {
    pub fn new(endpoint: &str, heartbeat_interval: Duration) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidEndpoint {
                url: endpoint.to_string(),
                reason: "scheme must be ws or wss".to_string(),
            });
        }
        Ok(Self {
            endpoint,
            heartbeat_interval,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        })
    }

    /// Override how long a closing socket waits for the peer.
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    fn connect_url(&self, options: &ConnectOptions) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(instance_id) = &options.instance_id {
                query.append_pair("instance_id", instance_id);
            }
            if let Some(max_concurrency) = options.max_concurrency {
                query.append_pair("max_concurrency", &max_concurrency.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        url
    }
}

impl Transport for WsTransport {
    fn connect(
        &self,
        options: ConnectOptions,
    ) -> BoxFuture<'_, Result<Arc<dyn WorkerConnection>, TransportError>> {
        Box::pin(async move {
            let url = self.connect_url(&options);
            let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;

            let connection = Arc::new(WsConnection::new());
            tracing::debug!(connection_id = %connection.id, url = %url, "WebSocket connected");

            tokio::spawn(drive(
                stream,
                connection.clone(),
                self.heartbeat_interval,
                self.close_timeout,
            ));

            if options.handle_shutdown_signals {
                let connection = connection.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!(connection_id = %connection.id, "Ctrl-C received, closing worker socket");
                        connection.close();
                    }
                });
            }

            Ok(connection as Arc<dyn WorkerConnection>)
        })
    }
}

/// Connection state shared between the handle and its driver task.
#[derive(Debug)]
pub struct WsConnection {
    id: String,
    state: AtomicU8,
    ready_state: AtomicU8,
    pending_heartbeats: AtomicU32,
    close_requested: Notify,
    abort_requested: Notify,
    closed_tx: watch::Sender<bool>,
}

impl WsConnection {
    fn new() -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: AtomicU8::new(ConnectionState::Active as u8),
            ready_state: AtomicU8::new(TransportReadyState::Open.as_raw()),
            pending_heartbeats: AtomicU32::new(0),
            close_requested: Notify::new(),
            abort_requested: Notify::new(),
            closed_tx,
        }
    }

    fn set(&self, state: ConnectionState, ready_state: TransportReadyState) {
        self.state.store(state as u8, Ordering::SeqCst);
        self.ready_state.store(ready_state.as_raw(), Ordering::SeqCst);
    }
}

impl WorkerConnection for WsConnection {
    fn connection_id(&self) -> Probe<String> {
        Probe::Present(self.id.clone())
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::SeqCst))
    }

    fn ready_state(&self) -> Probe<u8> {
        Probe::Present(self.ready_state.load(Ordering::SeqCst))
    }

    fn pending_heartbeats(&self) -> Probe<u32> {
        Probe::Present(self.pending_heartbeats.load(Ordering::SeqCst))
    }

    fn close(&self) {
        // notify_one stores a permit if the driver is not currently waiting.
        self.close_requested.notify_one();
    }

    fn abort(&self) {
        self.abort_requested.notify_one();
    }

    fn closed(&self) -> BoxFuture<'_, ()> {
        let mut rx = self.closed_tx.subscribe();
        Box::pin(async move {
            let _ = rx.wait_for(|closed| *closed).await;
        })
    }
}

async fn drive<S>(stream: S, connection: Arc<WsConnection>, heartbeat_interval: Duration, close_timeout: Duration)
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut source) = stream.split();
    let mut ticker = time::interval_at(time::Instant::now() + heartbeat_interval, heartbeat_interval);
    let mut closing = false;
    let mut close_deadline = time::Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick(), if !closing => {
                let missed = connection.pending_heartbeats.fetch_add(1, Ordering::SeqCst) + 1;
                if missed > 1 {
                    tracing::warn!(connection_id = %connection.id, missed = missed - 1, "Heartbeat not acknowledged");
                }
                if let Err(e) = sink.send(Message::Ping(Vec::new().into())).await {
                    tracing::warn!(connection_id = %connection.id, error = %e, "Failed to send heartbeat");
                    break;
                }
            }
            _ = connection.close_requested.notified(), if !closing => {
                closing = true;
                close_deadline = time::Instant::now() + close_timeout;
                connection.set(ConnectionState::Closing, TransportReadyState::Closing);
                if let Err(e) = sink.send(Message::Close(None)).await {
                    tracing::debug!(connection_id = %connection.id, error = %e, "Close frame not sent");
                    break;
                }
            }
            _ = time::sleep_until(close_deadline), if closing => {
                tracing::warn!(
                    connection_id = %connection.id,
                    timeout_ms = close_timeout.as_millis() as u64,
                    "Dispatcher did not answer the close frame, dropping socket"
                );
                break;
            }
            _ = connection.abort_requested.notified() => {
                tracing::info!(connection_id = %connection.id, "Worker socket aborted");
                break;
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Pong(_))) => {
                    connection.pending_heartbeats.store(0, Ordering::SeqCst);
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(connection_id = %connection.id, frame = ?frame, "Dispatcher closed the connection");
                    if !closing {
                        connection.set(ConnectionState::Closing, TransportReadyState::Closing);
                        let _ = sink.send(Message::Close(None)).await;
                    }
                    break;
                }
                Some(Ok(other)) => {
                    tracing::trace!(connection_id = %connection.id, len = other.len(), "Ignoring data frame");
                }
                Some(Err(e)) => {
                    tracing::warn!(connection_id = %connection.id, error = %e, "WebSocket error");
                    break;
                }
                None => break,
            }
        }
    }

    drop(sink);
    drop(source);
    connection.set(ConnectionState::Closed, TransportReadyState::Closed);
    connection.closed_tx.send_replace(true);
    tracing::info!(connection_id = %connection.id, "Worker socket closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_websocket_endpoints() {
        let err = WsTransport::new("http://dispatcher:8288", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint { .. }));
        assert!(WsTransport::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn connect_url_carries_options() {
        let transport = WsTransport::new("ws://127.0.0.1:8288/connect", Duration::from_secs(1)).unwrap();
        let url = transport.connect_url(&ConnectOptions {
            instance_id: Some("worker-7".into()),
            max_concurrency: Some(8),
            handle_shutdown_signals: false,
        });
        assert_eq!(url.as_str(), "ws://127.0.0.1:8288/connect?instance_id=worker-7&max_concurrency=8");

        let bare = transport.connect_url(&ConnectOptions::default());
        assert_eq!(bare.as_str(), "ws://127.0.0.1:8288/connect");
    }

    #[test]
    fn new_connection_reports_open() {
        let connection = WsConnection::new();
        assert_eq!(connection.state(), ConnectionState::Active);
        assert_eq!(connection.ready_state(), Probe::Present(1));
        assert_eq!(connection.pending_heartbeats(), Probe::Present(0));
    }
}
