//! Control actions and how each one presents canonical state

use crate::core::state::{AgentState, PermissionMode};
use crate::sync::BindingGroup;

/// What a control does when pressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Plan mode on/off
    TogglePlan,
    /// Step through every permission mode
    CycleMode,
    /// Sonnet <-> Opus
    SwitchModel,
    /// Type a fixed instruction into the agent
    SendCommand { text: String, label: Option<String> },
    /// Shows whether permissions are bypassed; pressing cycles the mode
    YoloIndicator,
}

impl Action {
    pub fn group(&self) -> BindingGroup {
        match self {
            Action::TogglePlan => BindingGroup("toggle_plan"),
            Action::CycleMode => BindingGroup("cycle_mode"),
            Action::SwitchModel => BindingGroup("switch_model"),
            Action::SendCommand { .. } => BindingGroup("send_command"),
            Action::YoloIndicator => BindingGroup("yolo_indicator"),
        }
    }

    /// Resolve the control's capabilities once, at registration
    pub fn kind(&self) -> ControlKind {
        match self {
            Action::TogglePlan => ControlKind::Toggleable(Toggle::Plan),
            Action::YoloIndicator => ControlKind::Toggleable(Toggle::Yolo),
            Action::CycleMode => ControlKind::TitledOnly(Titled::Mode),
            Action::SwitchModel => ControlKind::TitledOnly(Titled::Model),
            Action::SendCommand { label, .. } => {
                ControlKind::TitledOnly(Titled::Command(label.clone()))
            }
        }
    }
}

/// Two-state controls, which also take a visual state index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Plan,
    Yolo,
}

/// Controls that only show a title and an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Titled {
    Mode,
    Model,
    Command(Option<String>),
}

/// Capability variant of a control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    Toggleable(Toggle),
    TitledOnly(Titled),
}

/// Everything a control shows for one state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Face {
    pub title: String,
    pub image: String,
    /// Only set for toggleable controls
    pub state: Option<u8>,
}

impl ControlKind {
    pub fn is_toggleable(&self) -> bool {
        matches!(self, ControlKind::Toggleable(_))
    }

    /// What the control shows for `state`
    pub fn face(&self, state: &AgentState, default_label: &str) -> Face {
        match self {
            ControlKind::Toggleable(Toggle::Plan) => {
                let on = state.permission_mode == PermissionMode::Plan;
                Face {
                    title: state.permission_mode.label().to_string(),
                    image: mode_image(state.permission_mode),
                    state: Some(on as u8),
                }
            }
            ControlKind::Toggleable(Toggle::Yolo) => {
                let on = state.is_yolo();
                Face {
                    title: if on { "YOLO" } else { "Safe" }.to_string(),
                    image: if on { "yolo-on" } else { "yolo-off" }.to_string(),
                    state: Some(on as u8),
                }
            }
            ControlKind::TitledOnly(Titled::Mode) => Face {
                title: state.permission_mode.label().to_string(),
                image: mode_image(state.permission_mode),
                state: None,
            },
            ControlKind::TitledOnly(Titled::Model) => Face {
                title: state.current_model.label().to_string(),
                image: format!("model-{}", state.current_model.as_str()),
                state: None,
            },
            ControlKind::TitledOnly(Titled::Command(label)) => Face {
                title: label.clone().unwrap_or_else(|| default_label.to_string()),
                image: "command".to_string(),
                state: None,
            },
        }
    }
}

fn mode_image(mode: PermissionMode) -> String {
    format!("mode-{}", mode.as_str())
}
