//! worker-link
//!
//! Runs a worker that holds a persistent dispatcher connection and serves
//! health probes for it.
//!
//! ```text
//!                       ┌───────────────────────────────────────────────┐
//!                       │                  WORKER                        │
//!                       │                                                │
//!   Dispatcher  ◀───────┼── transport ◀── connection manager             │
//!   (WebSocket)         │                     │                          │
//!                       │                     ▼                          │
//!                       │              health diagnostics                │
//!                       │                     │                          │
//!                       │                     ▼                          │
//!   Orchestrator ───────┼──▶ admin ──▶ health aggregator ◀── monitor     │
//!   (probes)            │                                                │
//!                       │   SIGTERM/SIGINT ──▶ shutdown coordinator      │
//!                       └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use worker_link::config::{load_config, ConnectionMode, WorkerConfig};
use worker_link::lifecycle::startup;

#[derive(Parser)]
#[command(name = "worker-link")]
#[command(about = "Worker connection lifecycle and health diagnostics", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run without a persistent dispatcher connection.
    #[arg(long)]
    connectionless: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => WorkerConfig::default(),
    };
    if args.connectionless {
        config.mode = ConnectionMode::Connectionless;
    }

    startup::run(config).await?;
    Ok(())
}
