//! Error types for the CLI driver

use stagehand_core::StagehandError;
use thiserror::Error;

/// Errors raised while running a step script
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Invalid step: {0:?} (expected kind:id, revert, commit or reload)")]
    InvalidStep(String),

    #[error("{0} needs a current workspace")]
    NoCurrentWorkspace(String),

    #[error("No revertable switch to {0}")]
    NoRevertToken(&'static str),

    #[error("A revertable switch is pending; revert or commit it first")]
    RevertPending,

    #[error(transparent)]
    Core(#[from] StagehandError),
}
