//! Configuration loader with environment variable overrides
//!
//! Loads configuration from `.stagehand.toml` in project root or user config directory.

use super::types::StagehandConfig;
use std::path::{Path, PathBuf};

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidOverride { name: String, value: String },
}

impl From<ConfigError> for crate::StagehandError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ReadError(e) => crate::StagehandError::Io(e),
            other => crate::StagehandError::Config(other.to_string()),
        }
    }
}

/// Load configuration from various sources
///
/// Priority order:
/// 1. Project-level `.stagehand.toml`
/// 2. User-level `~/.config/stagehand/config.toml`
/// 3. Default configuration
pub fn load_config(project_dir: &Path) -> Result<StagehandConfig, ConfigError> {
    let project_config = project_dir.join(".stagehand.toml");
    if project_config.exists() {
        return load_from_file(&project_config);
    }

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            return load_from_file(&user_config);
        }
    }

    apply_env_overrides(StagehandConfig::default())
}

/// User config file path
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("stagehand").join("config.toml"))
}

/// Load configuration from a specific file
pub fn load_from_file(path: &Path) -> Result<StagehandConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: StagehandConfig = toml::from_str(&content)?;
    tracing::debug!(path = %path.display(), workspaces = config.catalog.len(), "loaded config");
    apply_env_overrides(config)
}

/// Apply environment variable overrides for transition defaults
///
/// Supports:
/// - STAGEHAND_WAIT_UNLOAD -> transitions.wait_unload
/// - STAGEHAND_REVERT_WAIT_UNLOAD -> transitions.revert_wait_unload
/// - STAGEHAND_IN_PLACE_RELOAD -> transitions.in_place_reload
/// - STAGEHAND_EVENT_CAPACITY -> transitions.event_capacity
fn apply_env_overrides(config: StagehandConfig) -> Result<StagehandConfig, ConfigError> {
    apply_overrides(config, |name| std::env::var(name).ok())
}

fn apply_overrides<F>(mut config: StagehandConfig, lookup: F) -> Result<StagehandConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let flags: [(&str, &mut bool); 3] = [
        ("STAGEHAND_WAIT_UNLOAD", &mut config.transitions.wait_unload),
        ("STAGEHAND_REVERT_WAIT_UNLOAD", &mut config.transitions.revert_wait_unload),
        ("STAGEHAND_IN_PLACE_RELOAD", &mut config.transitions.in_place_reload),
    ];
    for (name, slot) in flags {
        if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
            *slot = parse_bool(name, &value)?;
        }
    }

    if let Some(value) = lookup("STAGEHAND_EVENT_CAPACITY").filter(|v| !v.is_empty()) {
        config.transitions.event_capacity =
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidOverride {
                    name: "STAGEHAND_EVENT_CAPACITY".to_string(),
                    value: value.clone(),
                })?;
    }

    Ok(config)
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidOverride {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Parse the sample configuration
pub fn load_sample_config() -> Result<StagehandConfig, ConfigError> {
    Ok(toml::from_str(sample_config())?)
}

/// Create a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Stagehand Configuration
# Place this file in your project root as .stagehand.toml
# or in ~/.config/stagehand/config.toml for global settings

[transitions]
# Wait for the outgoing workspace to unload before a switch returns
wait_unload = true

# Wait for the unload when reverting a revertable switch
revert_wait_unload = false

# Reload the only loaded workspace in place (no empty window)
in_place_reload = true

# Consume pending preloads when a transition targets them
use_preloads = true

# Transition event channel capacity
event_capacity = 1024

# Workspaces the in-memory host can load; build index = position
[[catalog]]
name = "Title"
objects = [{ name = "Camera" }, { name = "Menu" }]

[[catalog]]
name = "Level1"
load_steps = 6
objects = [{ name = "Camera" }, { name = "Player" }, { name = "PauseMenu", active = false }]

[[catalog]]
name = "Level2"
path = "levels/level2"
load_steps = 8
objects = [{ name = "Camera" }, { name = "Player" }]
"#
}
