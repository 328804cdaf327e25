use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "worker-cli")]
#[command(about = "Query a running worker's health endpoints", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8090")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full health report across all checks
    Health,
    /// Liveness probe
    Live,
    /// Readiness probe
    Ready,
    /// Detailed connection verdict
    Connection,
    /// Runtime summary
    Status,
}

impl Commands {
    fn path(&self) -> &'static str {
        match self {
            Commands::Health => "/health",
            Commands::Live => "/health/live",
            Commands::Ready => "/health/ready",
            Commands::Connection => "/health/connection",
            Commands::Status => "/admin/status",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}{}", cli.url.trim_end_matches('/'), cli.command.path()))
        .send()
        .await?;
    let healthy = print_response(res).await?;

    if !healthy {
        std::process::exit(1);
    }
    Ok(())
}

/// Print the body. Returns false when the worker reported itself unavailable.
async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        eprintln!("Worker reports unhealthy ({})", status);
    } else if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(false);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(status.is_success())
}
