//! Agent transport - how the sync layer drives the Claude CLI
//!
//! The dispatcher only relies on the success/failure contract of
//! `AgentTransport`; how requests reach the agent is up to the implementation.

mod keystroke;
mod pty;

pub use keystroke::{KeystrokeTransport, SHIFT_TAB};
pub use pty::PtyTransport;

use crate::core::error::TransportError;
use crate::core::state::{Model, PermissionMode};
use async_trait::async_trait;
use tracing::info;

/// A requested permission-mode change, as seen by the canonical store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: PermissionMode,
    pub to: PermissionMode,
}

impl ModeTransition {
    pub fn new(from: PermissionMode, to: PermissionMode) -> Self {
        Self { from, to }
    }

    /// Forward cycle steps the agent needs to take
    pub fn steps(&self) -> usize {
        self.from.steps_to(self.to)
    }

    /// Whether the agent shows `mode` on its way, before it reaches `to`
    pub fn passes_through(&self, mode: PermissionMode) -> bool {
        self.from.steps_to(mode) < self.steps()
    }
}

/// Side-effecting requests against the external agent
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Move between plan mode and the prior non-plan mode
    async fn toggle_permission_mode(
        &self,
        transition: ModeTransition,
    ) -> Result<(), TransportError>;

    /// Select `model`
    async fn switch_model(&self, model: Model) -> Result<(), TransportError>;

    /// Advance one step in the permission-mode cycle
    async fn cycle_mode(&self, transition: ModeTransition) -> Result<(), TransportError>;

    /// Forward free text as a command
    async fn send_text(&self, text: &str) -> Result<(), TransportError>;
}

/// Accepts every request without an agent attached (`run --no-agent`)
#[derive(Debug, Default)]
pub struct LoopbackTransport;

#[async_trait]
impl AgentTransport for LoopbackTransport {
    async fn toggle_permission_mode(
        &self,
        transition: ModeTransition,
    ) -> Result<(), TransportError> {
        info!(
            "[loopback] toggle permission mode {} -> {}",
            transition.from, transition.to
        );
        Ok(())
    }

    async fn switch_model(&self, model: Model) -> Result<(), TransportError> {
        info!("[loopback] switch model to {}", model);
        Ok(())
    }

    async fn cycle_mode(&self, transition: ModeTransition) -> Result<(), TransportError> {
        info!(
            "[loopback] cycle mode {} -> {}",
            transition.from, transition.to
        );
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        info!("[loopback] send text {:?}", text);
        Ok(())
    }
}
