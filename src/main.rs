//! Host binary: serves the troubleshooter panel and supervises the helper

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use matlab_troubleshooter::panel::{self, NoticeBoard, PanelConfig, PanelState};
use matlab_troubleshooter::supervisor::{EnvInterpreterProvider, InterpreterPicker, Supervisor};
use matlab_troubleshooter::tracing::{init_tracing, shutdown_tracing, LogOptions};
use matlab_troubleshooter::{ChatBridge, HostConfig, HostController, Settings};

#[derive(Parser, Debug)]
#[command(name = "troubleshooter", version, about = "MATLAB troubleshooting assistant panel")]
struct Cli {
    /// Root of the installed extension (holds src/ and server/)
    #[arg(long, env = "TROUBLESHOOTER_EXTENSION_DIR", default_value = ".")]
    extension_dir: PathBuf,

    /// Workspace whose .vscode/settings.json overrides user settings
    #[arg(long, env = "TROUBLESHOOTER_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// User settings file (defaults to the OS config dir)
    #[arg(long, env = "TROUBLESHOOTER_SETTINGS")]
    settings: Option<PathBuf>,

    /// Extra directory to search for the helper program (repeatable)
    #[arg(long = "program-dir")]
    program_dirs: Vec<PathBuf>,

    /// Panel listen port
    #[arg(long, env = "TROUBLESHOOTER_PANEL_PORT", default_value_t = 8765)]
    panel_port: u16,

    /// Helper port
    #[arg(long, env = "TROUBLESHOOTER_HELPER_PORT", default_value_t = 5000)]
    helper_port: u16,

    /// OTLP collector endpoint, e.g. http://localhost:4317
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// Log JSON lines instead of text
    #[arg(long)]
    json: bool,

    /// Debug logging for everything
    #[arg(short, long)]
    verbose: bool,
}

/// Asks for an interpreter path on the terminal
struct ConsolePicker;

#[async_trait]
impl InterpreterPicker for ConsolePicker {
    async fn pick_interpreter(&self) -> Option<PathBuf> {
        eprint!("Python interpreter is required but not found. Path to a Python interpreter (empty to cancel): ");
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let path = line.trim();
                (!path.is_empty()).then(|| PathBuf::from(path))
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(
        "matlab-troubleshooter",
        &LogOptions {
            verbose: cli.verbose,
            json: cli.json,
            otlp_endpoint: cli.otlp_endpoint.clone(),
        },
    )
    .map_err(|e| anyhow::anyhow!(e))
    .context("failed to initialize tracing")?;

    let user_settings = cli.settings.clone().or_else(Settings::user_settings_path);
    let workspace_settings = cli
        .workspace
        .as_deref()
        .map(Settings::workspace_settings_path);
    let settings = Settings::load(user_settings.as_deref(), workspace_settings.as_deref())
        .context("failed to load settings")?;

    let config = HostConfig {
        helper_port: cli.helper_port,
        extension_dir: cli.extension_dir.clone(),
        extra_program_dirs: cli.program_dirs.clone(),
        ..HostConfig::default()
    };
    info!(
        helper = %config.base_url(),
        extension_dir = %config.extension_dir.display(),
        "Starting MATLAB troubleshooter"
    );

    let notices = Arc::new(NoticeBoard::new());
    let supervisor = Supervisor::from_config(
        &config,
        settings,
        Arc::new(EnvInterpreterProvider::new()),
        Arc::new(ConsolePicker),
    );
    let controller = HostController::new(config, Arc::new(supervisor), notices.clone());

    let bridge = ChatBridge::new(controller, notices.clone());
    let state = PanelState::new(bridge, notices);

    // Bring the helper up eagerly; failures show on the page and the first ask retries
    let opening = state.clone();
    tokio::spawn(async move { opening.open().await });

    let panel_config = PanelConfig {
        port: cli.panel_port,
        ..PanelConfig::default()
    };
    let listener = tokio::net::TcpListener::bind(panel_config.addr())
        .await
        .with_context(|| format!("failed to bind panel on {}", panel_config.addr()))?;

    panel::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C, shutting down");
    })
    .await
    .context("panel server failed")?;

    shutdown_tracing();
    Ok(())
}
