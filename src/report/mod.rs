//! State reporting path - what the agent says about itself
//!
//! Changes the agent makes on its own (e.g. entering plan mode, or a model
//! switch typed by the user) reach canonical state through here rather than
//! through dispatcher return values.

pub mod parser;
mod status;

pub use parser::{AnsiParser, ParsedElement};
pub use status::StatusExtractor;

use crate::core::state::{AgentState, Model, PermissionMode};

/// Facets of agent state observed in its output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateReport {
    pub permission_mode: Option<PermissionMode>,
    pub model: Option<Model>,
}

impl StateReport {
    pub fn is_empty(&self) -> bool {
        self.permission_mode.is_none() && self.model.is_none()
    }

    /// Fold the observed facets into `state`
    pub fn apply(&self, state: AgentState) -> AgentState {
        let state = match self.permission_mode {
            Some(mode) => state.with_permission_mode(mode),
            None => state,
        };
        match self.model {
            Some(model) => state.with_model(model),
            None => state,
        }
    }
}
