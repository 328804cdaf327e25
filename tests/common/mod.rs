//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpListener;
use worker_link::config::{ConnectionMode, WorkerConfig};
use worker_link::health::{CheckError, MemoryProbe, MemoryUsage};
use worker_link::registry::InMemoryFunctionRegistry;
use worker_link::transport::memory::MemoryTransport;
use worker_link::transport::Transport;
use worker_link::WorkerRuntime;

const MB: u64 = 1024 * 1024;

/// Memory probe reporting a fixed resident size.
pub struct FixedMemory(pub u64);

impl MemoryProbe for FixedMemory {
    fn sample(&self) -> Result<MemoryUsage, CheckError> {
        Ok(MemoryUsage {
            resident_bytes: self.0 * MB,
            virtual_bytes: 2 * self.0 * MB,
        })
    }
}

pub fn config(mode: ConnectionMode) -> WorkerConfig {
    let mut config = WorkerConfig {
        mode,
        environment: "test".to_string(),
        ..WorkerConfig::default()
    };
    config.connection.shutdown_timeout_ms = 200;
    config
}

/// Runtime over a given transport with one registered function and 64 MB resident.
pub fn runtime_with(config: WorkerConfig, transport: Arc<dyn Transport>) -> Arc<WorkerRuntime> {
    let registry = Arc::new(InMemoryFunctionRegistry::with_functions(["send-welcome-email"]));
    Arc::new(WorkerRuntime::with_memory_probe(
        config,
        transport,
        registry,
        Arc::new(FixedMemory(64)),
    ))
}

pub fn memory_runtime(mode: ConnectionMode) -> (Arc<WorkerRuntime>, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    (runtime_with(config(mode), transport.clone()), transport)
}

/// Serve the admin API on an ephemeral port.
pub async fn start_admin(runtime: Arc<WorkerRuntime>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut stop = runtime.subscribe_shutdown();
    tokio::spawn(worker_link::admin::serve(listener, runtime, async move {
        let _ = stop.recv().await;
    }));
    addr
}

/// Start a WebSocket dispatcher that reads every frame, answering pings and closes.
pub async fn start_dispatcher() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });
    addr
}

/// Start a WebSocket dispatcher that accepts and then never reads.
pub async fn start_silent_dispatcher() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(socket).await;
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(ws);
            });
        }
    });
    addr
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
