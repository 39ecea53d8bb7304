//! Native helper: serves `/health` and `/troubleshoot` on loopback

use anyhow::Context;
use clap::Parser;
use tracing::info;

use matlab_troubleshooter::helper::server;
use matlab_troubleshooter::tracing::{init_tracing, shutdown_tracing, LogOptions};

#[derive(Parser, Debug)]
#[command(name = "troubleshoot-helper", version, about = "MATLAB troubleshooting helper server")]
struct Cli {
    /// Interface to bind
    #[arg(long, env = "MATLAB_TROUBLESHOOTER_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "MATLAB_TROUBLESHOOTER_PORT", default_value_t = 5000)]
    port: u16,

    /// Log JSON lines instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(
        "troubleshoot-helper",
        &LogOptions {
            json: cli.json,
            ..LogOptions::default()
        },
    )
    .map_err(|e| anyhow::anyhow!(e))
    .context("failed to initialize tracing")?;

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    server::serve(listener, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C, shutting down");
    })
    .await
    .context("helper server failed")?;

    shutdown_tracing();
    Ok(())
}
