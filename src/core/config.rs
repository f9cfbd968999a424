//! Configuration management

use super::state::{AgentState, Model, PermissionMode};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Claude CLI and transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Path to claude CLI (empty = "claude" on PATH)
    #[serde(default)]
    pub cli_path: String,
    /// Default arguments for claude CLI
    #[serde(default)]
    pub default_args: Vec<String>,
    /// Upper bound on a single transport request
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
    /// Permission mode the agent is started in
    #[serde(default)]
    pub initial_mode: PermissionMode,
    /// Model the agent is started with
    #[serde(default)]
    pub initial_model: Model,
}

fn default_command_timeout() -> u64 {
    3000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cli_path: String::new(),
            default_args: Vec::new(),
            command_timeout_ms: default_command_timeout(),
            initial_mode: PermissionMode::default(),
            initial_model: Model::default(),
        }
    }
}

impl AgentConfig {
    /// CLI binary to launch
    pub fn cli(&self) -> &str {
        if self.cli_path.is_empty() {
            "claude"
        } else {
            &self.cli_path
        }
    }

    /// State the canonical store starts from
    pub fn initial_state(&self) -> AgentState {
        AgentState::new(self.initial_mode, self.initial_model)
    }
}

/// Surface (key binding) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Upper bound on a binding's key handler, including its acknowledgement
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_ms: u64,
    /// Title for send-command keys that don't carry their own label
    #[serde(default = "default_command_label")]
    pub default_command_label: String,
}

fn default_ack_timeout() -> u64 {
    5000
}

fn default_command_label() -> String {
    "Send".to_string()
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout(),
            default_command_label: default_command_label(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a file, falling back to defaults if it doesn't exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "agentdeck", "AgentDeckSync")
            .context("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Get the default configuration embedded in the binary
    pub fn default_config_str() -> &'static str {
        include_str!("../../config/default.toml")
    }
}
