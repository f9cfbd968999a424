//! Application event definitions

use crate::binding::Action;
use crate::report::StateReport;
use crate::sync::BindingId;
use tokio::sync::mpsc;

/// Lifecycle and input events delivered by the surface runtime
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// Control became visible
    Appear { binding: BindingId, action: Action },
    /// Control became invisible
    Disappear { binding: BindingId },
    /// Control was pressed
    KeyDown { binding: BindingId },
}

/// Application-wide events for inter-module communication
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Event from the surface runtime
    Surface(SurfaceEvent),

    /// The agent reported its own state in its output
    StateReport(StateReport),

    /// Agent process exited
    AgentExited(Option<i32>),

    /// Surface input reached EOF
    SurfaceClosed,
}

/// Sender for application events - wraps a tokio unbounded channel
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { tx }
    }

    /// Create a sender together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, event: AppEvent) -> Result<(), mpsc::error::SendError<AppEvent>> {
        self.tx.send(event)
    }
}
