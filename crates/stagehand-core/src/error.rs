//! Error types for Stagehand Core
//!
//! Provides a unified error type for all transition operations.
//!
//! Errors are detected at the point of violation and are never retried.
//! A transition that fails part-way is not rolled back: if the outgoing
//! workspace was already deactivated when the error surfaced, recovering it
//! (for example through a [`RevertToken`](crate::RevertToken)) is the
//! caller's responsibility.

use crate::types::WorkspaceHandle;
use thiserror::Error;

/// Result type for Stagehand Core operations
pub type Result<T> = std::result::Result<T, StagehandError>;

/// Unified error type for Stagehand Core
#[derive(Error, Debug)]
pub enum StagehandError {
    /// A deferred load was finalized a second time
    #[error("Deferred load already finalized: {0}")]
    AlreadyFinalized(String),

    /// The loaded identifier could not be resolved back to a workspace handle
    #[error("Could not resolve loaded workspace: {0}")]
    SceneResolutionFailed(String),

    /// The workspace a revert would return to is no longer loaded
    #[error("Revert target is no longer valid: {0}")]
    InvalidRevertTarget(WorkspaceHandle),

    /// The host refused to make a workspace the active one
    #[error("Host rejected activation of workspace {0}")]
    ActivationRejected(WorkspaceHandle),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StagehandError {
    /// Create a resolution error
    pub fn resolution(identifier: impl Into<String>) -> Self {
        StagehandError::SceneResolutionFailed(identifier.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        StagehandError::Config(msg.into())
    }
}
