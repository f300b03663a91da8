//! Shared type definitions
//!
//! Handles and load descriptors exchanged between the orchestrator and the host.

use serde::{Deserialize, Serialize};

/// Opaque handle to a loaded workspace
///
/// Handles are issued by the host. Whether a handle still refers to a loaded
/// workspace is a question for the host (`WorkspaceHost::is_valid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceHandle(u64);

impl WorkspaceHandle {
    /// Create a handle from a raw host identifier
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw host identifier
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WorkspaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque reference to a top-level object of a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef(u64);

impl ObjectRef {
    /// Create an object reference from a raw host identifier
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw host identifier
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// What the host should load
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum LoadTarget {
    /// Workspace name, or a path-style identifier
    Name(String),

    /// Build index of the workspace content
    Index(usize),
}

impl LoadTarget {
    /// Identifier used for logging and resolution
    pub fn identifier(&self) -> String {
        match self {
            LoadTarget::Name(name) => name.clone(),
            LoadTarget::Index(index) => format!("index:{}", index),
        }
    }
}

impl From<&str> for LoadTarget {
    fn from(name: &str) -> Self {
        LoadTarget::Name(name.to_string())
    }
}

impl From<String> for LoadTarget {
    fn from(name: String) -> Self {
        LoadTarget::Name(name)
    }
}

impl std::fmt::Display for LoadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.identifier())
    }
}

/// How a load interacts with already loaded workspaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Load next to the existing workspaces
    #[default]
    Additive,

    /// Replace every loaded workspace once the load completes
    Single,
}
