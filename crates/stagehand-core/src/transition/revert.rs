//! Revert tokens for revertable switches

use super::finish_unload;
use crate::error::{Result, StagehandError};
use crate::events::{PhaseTracker, TransitionId, TransitionPhase};
use crate::host::{activate_workspace, deactivate_roots, label, SharedHost};
use crate::snapshot::ActiveObjectSnapshot;
use crate::types::WorkspaceHandle;

/// Everything needed to undo a revertable switch
///
/// Consumed by [`revert`](Self::revert) or [`commit`](Self::commit), so a
/// switch can be undone at most once.
pub struct RevertToken {
    host: SharedHost,
    to_unload: WorkspaceHandle,
    to_activate: WorkspaceHandle,
    snapshot: ActiveObjectSnapshot,
    phases: PhaseTracker,
}

impl RevertToken {
    pub(crate) fn new(
        host: SharedHost,
        to_unload: WorkspaceHandle,
        to_activate: WorkspaceHandle,
        snapshot: ActiveObjectSnapshot,
        phases: PhaseTracker,
    ) -> Self {
        Self {
            host,
            to_unload,
            to_activate,
            snapshot,
            phases,
        }
    }

    /// Workspace the switch loaded; unloaded on revert
    pub fn to_unload(&self) -> WorkspaceHandle {
        self.to_unload
    }

    /// Workspace the switch left; restored on revert
    pub fn to_activate(&self) -> WorkspaceHandle {
        self.to_activate
    }

    /// Root objects that were active before the switch
    pub fn snapshot(&self) -> &ActiveObjectSnapshot {
        &self.snapshot
    }

    pub fn id(&self) -> TransitionId {
        self.phases.id()
    }

    pub fn phase(&self) -> TransitionPhase {
        self.phases.phase()
    }

    /// Undo the switch, unloading the workspace it loaded
    pub async fn revert(self, wait_unload: bool) -> Result<()> {
        let to_unload = self.to_unload;
        self.revert_unloading(to_unload, wait_unload).await
    }

    /// Undo the switch, unloading `other` instead of the recorded workspace
    ///
    /// Fails with [`StagehandError::InvalidRevertTarget`] when the workspace
    /// to restore has been unloaded in the meantime.
    pub async fn revert_unloading(mut self, other: WorkspaceHandle, wait_unload: bool) -> Result<()> {
        if !self.host.is_valid(self.to_activate) {
            return Err(StagehandError::InvalidRevertTarget(self.to_activate));
        }

        deactivate_roots(self.host.as_ref(), other);
        activate_workspace(self.host.as_ref(), self.to_activate)?;
        let unload = self.host.begin_unload(other);
        self.snapshot.reactivate(self.host.as_ref());

        tracing::info!(
            restored = %label(self.host.as_ref(), self.to_activate),
            unloading = %label(self.host.as_ref(), other),
            "reverted switch"
        );
        self.phases.advance(TransitionPhase::Reverted);
        finish_unload(&self.host, unload, wait_unload, self.phases).await;
        Ok(())
    }

    /// Keep the switch, unloading the workspace it left
    pub async fn commit(mut self, wait_unload: bool) {
        tracing::info!(
            kept = %label(self.host.as_ref(), self.to_unload),
            unloading = %label(self.host.as_ref(), self.to_activate),
            "committed switch"
        );
        self.phases.advance(TransitionPhase::UnloadingOld);
        let unload = self.host.begin_unload(self.to_activate);
        finish_unload(&self.host, unload, wait_unload, self.phases).await;
    }
}

impl std::fmt::Debug for RevertToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevertToken")
            .field("id", &self.phases.id())
            .field("to_unload", &self.to_unload)
            .field("to_activate", &self.to_activate)
            .field("snapshot", &self.snapshot.len())
            .finish()
    }
}
