//! Sends synthetic till sessions to a running server over HTTP.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use posflow_server::generator::run_generator;
use posflow_transport::HttpEventSink;

#[derive(Parser)]
#[command(name = "producer", about = "Generate point-of-sale traffic")]
struct Cli {
    /// Server base URL
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// Pause between sessions
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Stop after this many sessions (runs until Ctrl-C if omitted)
    #[arg(long)]
    sessions: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let sink = HttpEventSink::new(&cli.url)?;
    tracing::info!(endpoint = sink.endpoint(), "Producing events");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        on_signal.cancel();
    });

    let stats = run_generator(
        &sink,
        Duration::from_millis(cli.interval_ms),
        cli.sessions,
        &cancel,
    )
    .await?;

    tracing::info!(
        sessions = stats.sessions,
        events = stats.events_sent,
        failures = stats.send_failures,
        "Producer finished"
    );
    Ok(())
}
