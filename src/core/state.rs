//! Canonical agent state
//!
//! `AgentState` is a small `Copy` value. Every change produces a complete
//! replacement, so no reader ever sees one field advanced without the other.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::ParseError;

/// Claude Code permission mode
///
/// Cycle order matches Shift+Tab in the CLI and is also the display order:
/// Default -> AcceptEdits -> Plan -> BypassPermissions -> Default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

impl PermissionMode {
    /// All modes in cycle order
    pub const ALL: [PermissionMode; 4] = [
        PermissionMode::Default,
        PermissionMode::AcceptEdits,
        PermissionMode::Plan,
        PermissionMode::BypassPermissions,
    ];

    /// Position in the cycle order
    pub fn index(self) -> usize {
        match self {
            PermissionMode::Default => 0,
            PermissionMode::AcceptEdits => 1,
            PermissionMode::Plan => 2,
            PermissionMode::BypassPermissions => 3,
        }
    }

    /// Next mode in cycle order, wrapping from the last back to the first
    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    /// Number of forward cycle steps needed to get from `self` to `target`
    pub fn steps_to(self, target: PermissionMode) -> usize {
        (target.index() + Self::ALL.len() - self.index()) % Self::ALL.len()
    }

    /// Short label for a key face
    pub fn label(self) -> &'static str {
        match self {
            PermissionMode::Default => "Default",
            PermissionMode::AcceptEdits => "Accept",
            PermissionMode::Plan => "Plan",
            PermissionMode::BypassPermissions => "YOLO",
        }
    }

    /// Spelling used by the CLI (`--permission-mode`) and in config files
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::Plan => "plan",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::UnknownPermissionMode(s.to_string()))
    }
}

/// Model selected in the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    #[default]
    Sonnet,
    Opus,
}

impl Model {
    /// The other supported model
    pub fn other(self) -> Self {
        match self {
            Model::Sonnet => Model::Opus,
            Model::Opus => Model::Sonnet,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Model::Sonnet => "Sonnet",
            Model::Opus => "Opus",
        }
    }

    /// Alias accepted by `/model`
    pub fn as_str(self) -> &'static str {
        match self {
            Model::Sonnet => "sonnet",
            Model::Opus => "opus",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sonnet" => Ok(Model::Sonnet),
            "opus" => Ok(Model::Opus),
            _ => Err(ParseError::UnknownModel(s.to_string())),
        }
    }
}

/// Coarse classification used by the YOLO indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeClass {
    Standard,
    Bypass,
}

/// Canonical state of the controlled agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    pub permission_mode: PermissionMode,
    pub current_model: Model,
}

impl AgentState {
    pub fn new(permission_mode: PermissionMode, current_model: Model) -> Self {
        Self {
            permission_mode,
            current_model,
        }
    }

    /// Derived mode classification
    pub fn mode(&self) -> ModeClass {
        if self.permission_mode == PermissionMode::BypassPermissions {
            ModeClass::Bypass
        } else {
            ModeClass::Standard
        }
    }

    pub fn is_yolo(&self) -> bool {
        self.mode() == ModeClass::Bypass
    }

    pub fn with_permission_mode(self, permission_mode: PermissionMode) -> Self {
        Self {
            permission_mode,
            ..self
        }
    }

    pub fn with_model(self, current_model: Model) -> Self {
        Self {
            current_model,
            ..self
        }
    }
}
