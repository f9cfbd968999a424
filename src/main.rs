//! Agent Deck Sync - bridges a key surface runtime and the Claude Code CLI
//!
//! Surface events arrive as JSON lines on stdin, display updates leave as
//! JSON lines on stdout; logs go to stderr.

use agent_deck_sync::binding::{BindingManager, BindingSettings};
use agent_deck_sync::core::config::Config;
use agent_deck_sync::core::events::{AppEvent, EventSender};
use agent_deck_sync::surface::{read_events, StdioSurface, Surface};
use agent_deck_sync::sync::AgentSync;
use agent_deck_sync::transport::{AgentTransport, LoopbackTransport, PtyTransport};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "agent-deck-sync", about = "Keeps key surface controls in sync with Claude Code")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (default)
    Run {
        /// Don't start Claude; accept every request in-process
        #[arg(long)]
        no_agent: bool,
    },
    /// Print the config file location
    ConfigPath,
    /// Print the default configuration
    DefaultConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the surface protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Some(Commands::ConfigPath) => {
            let path = match cli.config {
                Some(path) => path,
                None => Config::config_path()?,
            };
            println!("{}", path.display());
            Ok(())
        }
        Some(Commands::DefaultConfig) => {
            print!("{}", Config::default_config_str());
            Ok(())
        }
        Some(Commands::Run { no_agent }) => run(cli.config, no_agent).await,
        None => run(cli.config, false).await,
    }
}

async fn run(config_path: Option<PathBuf>, no_agent: bool) -> Result<()> {
    let config = match config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    let (event_tx, mut event_rx) = EventSender::channel();

    let transport: Arc<dyn AgentTransport> = if no_agent {
        info!("Running without an agent (loopback transport)");
        Arc::new(LoopbackTransport)
    } else {
        Arc::new(
            PtyTransport::spawn(&config.agent, event_tx.clone())
                .context("Failed to start agent")?,
        )
    };

    let sync = Arc::new(AgentSync::new(
        config.agent.initial_state(),
        transport,
        Duration::from_millis(config.agent.command_timeout_ms),
    ));
    info!(state = ?sync.get_state(), "Initial agent state");

    let surface: Arc<dyn Surface> = Arc::new(StdioSurface::new(tokio::io::stdout()));
    let mut bindings = BindingManager::new(
        Arc::clone(&sync),
        surface,
        BindingSettings::from(&config.surface),
    );

    tokio::spawn(read_events(BufReader::new(tokio::io::stdin()), event_tx.clone()));

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    AppEvent::Surface(event) => {
                        // Key presses run detached; failures are acknowledged on the key itself
                        let _ = bindings.handle_event(event).await;
                    }
                    AppEvent::StateReport(report) => {
                        sync.apply_report(report);
                    }
                    AppEvent::AgentExited(code) => {
                        warn!("Agent exited ({:?}), shutting down", code);
                        break;
                    }
                    AppEvent::SurfaceClosed => {
                        info!("Surface closed, shutting down");
                        break;
                    }
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    bindings.clear();
    Ok(())
}
