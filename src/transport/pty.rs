//! Claude CLI in a PTY, driven by keystrokes

use super::keystroke::{KeystrokeTransport, SharedWriter};
use super::{AgentTransport, ModeTransition};
use crate::core::config::AgentConfig;
use crate::core::error::TransportError;
use crate::core::events::{AppEvent, EventSender};
use crate::core::state::{Model, PermissionMode};
use crate::report::StatusExtractor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type PtyWriter = Box<dyn Write + Send>;

/// Transport that owns a Claude CLI process running in a pseudo-terminal
///
/// Output is fed through a `StatusExtractor`; observed state is sent back
/// as `AppEvent::StateReport`.
pub struct PtyTransport {
    keys: KeystrokeTransport<PtyWriter>,
    /// Kept alive for the lifetime of the process; dropping it closes the PTY
    master: Arc<Mutex<Option<Box<dyn MasterPty + Send>>>>,
    running: Arc<AtomicBool>,
}

impl PtyTransport {
    /// Spawn the CLI and start reading its output
    pub fn spawn(config: &AgentConfig, event_tx: EventSender) -> Result<Self> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: 50,
                cols: 120,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to create PTY")?;

        let mut cmd = CommandBuilder::new(config.cli());
        for arg in &config.default_args {
            cmd.arg(arg);
        }

        // Start the agent in the state the canonical store assumes
        if config.initial_mode != PermissionMode::Default {
            cmd.arg("--permission-mode");
            cmd.arg(config.initial_mode.as_str());
        }
        cmd.arg("--model");
        cmd.arg(config.initial_model.as_str());

        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");

        info!("Starting Claude CLI: {} {:?}", config.cli(), config.default_args);

        let child = pair
            .slave
            .spawn_command(cmd)
            .context("Failed to spawn Claude CLI")?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;
        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;

        let shared_writer: SharedWriter<PtyWriter> = Arc::new(Mutex::new(Some(writer)));
        let running = Arc::new(AtomicBool::new(true));

        start_reader_thread(
            reader,
            child,
            Arc::clone(&shared_writer),
            Arc::clone(&running),
            event_tx,
        )?;

        Ok(Self {
            keys: KeystrokeTransport::from_shared(shared_writer),
            master: Arc::new(Mutex::new(Some(pair.master))),
            running,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resize the agent's terminal
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        if let Some(master) = self.master.lock().as_ref() {
            master
                .resize(PtySize {
                    rows,
                    cols,
                    pixel_width: 0,
                    pixel_height: 0,
                })
                .context("Failed to resize PTY")?;
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), TransportError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(TransportError::NotRunning)
        }
    }
}

impl Drop for PtyTransport {
    fn drop(&mut self) {
        self.keys.close();
        self.master.lock().take();
    }
}

#[async_trait]
impl AgentTransport for PtyTransport {
    async fn toggle_permission_mode(
        &self,
        transition: ModeTransition,
    ) -> Result<(), TransportError> {
        self.ensure_running()?;
        self.keys.toggle_permission_mode(transition).await
    }

    async fn switch_model(&self, model: Model) -> Result<(), TransportError> {
        self.ensure_running()?;
        self.keys.switch_model(model).await
    }

    async fn cycle_mode(&self, transition: ModeTransition) -> Result<(), TransportError> {
        self.ensure_running()?;
        self.keys.cycle_mode(transition).await
    }

    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.ensure_running()?;
        self.keys.send_text(text).await
    }
}

/// Read PTY output on a dedicated thread until the CLI exits
fn start_reader_thread(
    mut reader: Box<dyn Read + Send>,
    mut child: Box<dyn portable_pty::Child + Send + Sync>,
    writer: SharedWriter<PtyWriter>,
    running: Arc<AtomicBool>,
    event_tx: EventSender,
) -> Result<()> {
    std::thread::Builder::new()
        .name("agent-pty-reader".into())
        .spawn(move || {
            let mut extractor = StatusExtractor::new();
            let mut buffer = [0u8; 4096];

            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => {
                        debug!("PTY EOF");
                        break;
                    }
                    Ok(n) => {
                        if let Some(report) = extractor.process(&buffer[..n]) {
                            debug!("Agent reported {:?}", report);
                            let _ = event_tx.send(AppEvent::StateReport(report));
                        }
                    }
                    Err(e) => {
                        if e.kind() != std::io::ErrorKind::Interrupted {
                            warn!("PTY read error: {}", e);
                            break;
                        }
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            writer.lock().take();

            let exit_code = match child.wait() {
                Ok(status) => {
                    info!("Claude CLI exited with status: {:?}", status);
                    Some(status.exit_code() as i32)
                }
                Err(e) => {
                    error!("Failed to wait for Claude CLI: {}", e);
                    None
                }
            };

            let _ = event_tx.send(AppEvent::AgentExited(exit_code));
        })
        .context("Failed to start PTY reader thread")?;

    Ok(())
}
