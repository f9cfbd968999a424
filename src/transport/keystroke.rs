//! Keystroke encoding of agent requests
//!
//! The CLI has no control channel besides its terminal input, so every
//! request becomes keys typed into it:
//! - permission mode: Shift+Tab once per cycle step
//! - model: `/model <name>` + Enter
//! - text: the text itself + Enter

use super::{AgentTransport, ModeTransition};
use crate::core::error::TransportError;
use crate::core::state::Model;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shift+Tab (back-tab) as sent by xterm-compatible terminals
pub const SHIFT_TAB: &[u8] = b"\x1b[Z";

/// Enter as typed in a raw-mode terminal
const ENTER: &[u8] = b"\r";

/// Writer shared with whoever owns the agent's terminal; `None` once closed
pub type SharedWriter<W> = Arc<Mutex<Option<W>>>;

/// Transport that types requests into the agent's terminal input
pub struct KeystrokeTransport<W> {
    writer: SharedWriter<W>,
    /// Pause between repeated Shift+Tab presses so the CLI redraws in between
    key_interval: Duration,
}

impl<W: Write + Send> KeystrokeTransport<W> {
    pub fn new(writer: W) -> Self {
        Self::from_shared(Arc::new(Mutex::new(Some(writer))))
    }

    pub fn from_shared(writer: SharedWriter<W>) -> Self {
        Self {
            writer,
            key_interval: Duration::from_millis(50),
        }
    }

    pub fn with_key_interval(mut self, key_interval: Duration) -> Self {
        self.key_interval = key_interval;
        self
    }

    /// Drop the writer; later requests fail with `TransportError::Closed`
    pub fn close(&self) {
        self.writer.lock().take();
    }

    fn write_keys(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    async fn press_shift_tab(&self, times: usize) -> Result<(), TransportError> {
        debug!("Sending Shift+Tab x{}", times);
        for i in 0..times {
            if i > 0 && !self.key_interval.is_zero() {
                tokio::time::sleep(self.key_interval).await;
            }
            self.write_keys(SHIFT_TAB)?;
        }
        Ok(())
    }

    fn type_line(&self, line: &str) -> Result<(), TransportError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut bytes = Vec::with_capacity(line.len() + ENTER.len());
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(ENTER);
        self.write_keys(&bytes)
    }
}

#[async_trait]
impl<W: Write + Send> AgentTransport for KeystrokeTransport<W> {
    async fn toggle_permission_mode(
        &self,
        transition: ModeTransition,
    ) -> Result<(), TransportError> {
        self.press_shift_tab(transition.steps()).await
    }

    async fn switch_model(&self, model: Model) -> Result<(), TransportError> {
        self.type_line(&format!("/model {}", model.as_str()))
    }

    async fn cycle_mode(&self, transition: ModeTransition) -> Result<(), TransportError> {
        self.press_shift_tab(transition.steps()).await
    }

    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.type_line(text)
    }
}
