//! Configuration module for Stagehand
//!
//! Handles loading and parsing of `.stagehand.toml` configuration files
//! with support for environment variable overrides.

mod loader;
mod types;

pub use loader::{load_config, load_from_file, load_sample_config, sample_config, user_config_path, ConfigError};
pub use types::{StagehandConfig, TransitionConfig};
