//! Configuration types for Stagehand
//!
//! Defines the structure of `.stagehand.toml` configuration.

use crate::memory::WorkspaceDefinition;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagehandConfig {
    /// Transition defaults
    #[serde(default)]
    pub transitions: TransitionConfig,

    /// Workspaces the in-memory host can load, in build-index order
    #[serde(default)]
    pub catalog: Vec<WorkspaceDefinition>,
}

/// Defaults applied when a caller does not choose explicitly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionConfig {
    /// Whether a switch waits for the outgoing unload before returning
    #[serde(default = "default_true")]
    pub wait_unload: bool,

    /// Whether a revert waits for the unload before returning
    #[serde(default)]
    pub revert_wait_unload: bool,

    /// Reload the only loaded workspace in place instead of unload-then-load
    #[serde(default = "default_true")]
    pub in_place_reload: bool,

    /// Consume matching preloads when preparing a transition
    #[serde(default = "default_true")]
    pub use_preloads: bool,

    /// Capacity of the transition event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            wait_unload: true,
            revert_wait_unload: false,
            in_place_reload: true,
            use_preloads: true,
            event_capacity: default_event_capacity(),
        }
    }
}

impl StagehandConfig {
    /// Look up a catalog entry by name
    pub fn workspace(&self, name: &str) -> Option<&WorkspaceDefinition> {
        self.catalog.iter().find(|ws| ws.name == name)
    }
}
