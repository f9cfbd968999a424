//! Agent Deck Sync
//!
//! Keeps the controls of a hardware key surface in sync with the state of a
//! Claude Code CLI session.
//!
//! # Features
//! - One canonical agent state (permission mode, model) shared by every control
//! - Plan toggle, mode cycling, model switching and free-text commands,
//!   each applied only after the agent accepted it
//! - Fan-out of every state change to all visible controls
//! - Claude CLI driven through a PTY; its status line feeds state back
//! - Surface runtime attached over line-delimited JSON on stdio

pub mod binding;
pub mod core;
pub mod report;
pub mod surface;
pub mod sync;
pub mod transport;

pub use binding::{Action, Binding, BindingManager, BindingSettings, KeyOutcome};
pub use core::config::Config;
pub use core::error::{DispatchError, NotifyError, SurfaceError, TransportError};
pub use core::events::{AppEvent, EventSender, SurfaceEvent};
pub use core::state::{AgentState, ModeClass, Model, PermissionMode};
pub use report::{StateReport, StatusExtractor};
pub use surface::{StdioSurface, Surface};
pub use sync::{AgentSync, BindingGroup, BindingId};
pub use transport::{
    AgentTransport, KeystrokeTransport, LoopbackTransport, ModeTransition, PtyTransport,
};
