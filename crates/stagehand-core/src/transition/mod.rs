//! Workspace transitions
//!
//! One parameterized [`Transition`] covers every variant: adding a workspace,
//! switching away from one, and switching with the option to revert.
//!
//! # Ordering
//!
//! The outgoing workspace's root objects are deactivated before the incoming
//! workspace is finalized and made active, so two workspaces are never live
//! at once. The outgoing unload is always scheduled before reclamation is
//! requested; when the caller does not wait for the unload, reclamation runs
//! from the unload's completion callback.
//!
//! # Example
//!
//! ```ignore
//! let engine = TransitionEngine::new(host, registry, TransitionConfig::default());
//!
//! let level1 = engine.add("Level1", true).execute().await?.handle();
//! engine.switch("Level2", level1).execute().await?;
//!
//! let token = engine
//!     .switch_with_revertable("Menu", level2)
//!     .execute()
//!     .await?
//!     .into_revert_token()
//!     .expect("revertable switch");
//! token.revert(false).await?;
//! ```

mod engine;
mod revert;

pub use engine::TransitionEngine;
pub use revert::RevertToken;

use crate::deferred::DeferredLoad;
use crate::error::Result;
use crate::events::{PhaseTracker, TransitionId, TransitionPhase};
use crate::host::{activate_workspace, label, SharedHost};
use crate::operation::AsyncOperation;
use crate::progress::SharedProgressSink;
use crate::snapshot::ActiveObjectSnapshot;
use crate::types::WorkspaceHandle;
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    /// Capabilities of a transition
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TransitionFlags: u8 {
        /// Consume the target's preload entry, flushing older ones
        const WITH_PRELOAD = 1 << 0;
        /// Keep the outgoing workspace loaded and return a revert token
        const WITH_REVERT = 1 << 1;
        /// Wait for the outgoing unload before returning
        const WAIT_UNLOAD = 1 << 2;
        /// Make the loaded workspace the active one
        const CHANGE_ACTIVE = 1 << 3;
    }
}

/// Result of an executed transition
#[derive(Debug)]
pub enum TransitionOutcome {
    /// A workspace was loaded next to the existing ones
    Added(WorkspaceHandle),

    /// The outgoing workspace was replaced and unloaded
    Switched(WorkspaceHandle),

    /// The outgoing workspace is inert but loaded, and can be restored
    Revertable(RevertToken),
}

impl TransitionOutcome {
    /// The workspace the transition loaded
    pub fn handle(&self) -> WorkspaceHandle {
        match self {
            TransitionOutcome::Added(handle) | TransitionOutcome::Switched(handle) => *handle,
            TransitionOutcome::Revertable(token) => token.to_unload(),
        }
    }

    /// The revert token, if the transition was revertable
    pub fn into_revert_token(self) -> Option<RevertToken> {
        match self {
            TransitionOutcome::Revertable(token) => Some(token),
            _ => None,
        }
    }
}

/// A prepared transition
///
/// The incoming workspace has already started loading with its gate closed;
/// nothing visible happens until [`execute`](Self::execute).
pub struct Transition {
    host: SharedHost,
    load: DeferredLoad,
    from: Option<WorkspaceHandle>,
    flags: TransitionFlags,
    sink: Option<SharedProgressSink>,
    phases: PhaseTracker,
}

impl Transition {
    pub(crate) fn new(
        host: SharedHost,
        load: DeferredLoad,
        from: Option<WorkspaceHandle>,
        flags: TransitionFlags,
        phases: PhaseTracker,
    ) -> Self {
        Self {
            host,
            load,
            from,
            flags,
            sink: None,
            phases,
        }
    }

    /// Override whether the outgoing unload is awaited
    pub fn wait_unload(mut self, wait: bool) -> Self {
        self.flags.set(TransitionFlags::WAIT_UNLOAD, wait);
        self
    }

    /// Report load progress to `sink` while executing
    pub fn with_progress(mut self, sink: SharedProgressSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn id(&self) -> TransitionId {
        self.phases.id()
    }

    pub fn phase(&self) -> TransitionPhase {
        self.phases.phase()
    }

    pub fn flags(&self) -> TransitionFlags {
        self.flags
    }

    /// Identifier being loaded
    pub fn target(&self) -> String {
        self.load.identifier()
    }

    /// Workspace being transitioned away from, if any
    pub fn from(&self) -> Option<WorkspaceHandle> {
        self.from
    }

    /// Progress of the incoming load
    pub fn progress(&self) -> f32 {
        self.load.progress()
    }

    /// Run the transition
    ///
    /// On error nothing is rolled back: an outgoing workspace that was
    /// already deactivated stays deactivated.
    pub async fn execute(mut self) -> Result<TransitionOutcome> {
        let Some(from) = self.from else {
            let handle = self.activate_new().await?;
            return Ok(TransitionOutcome::Added(handle));
        };

        self.phases.advance(TransitionPhase::DeactivatingOld);
        let snapshot = ActiveObjectSnapshot::capture_and_deactivate(self.host.as_ref(), from);

        let handle = self.activate_new().await?;

        if self.flags.contains(TransitionFlags::WITH_REVERT) {
            tracing::info!(
                from = %label(self.host.as_ref(), from),
                to = %label(self.host.as_ref(), handle),
                "switched with revert token"
            );
            return Ok(TransitionOutcome::Revertable(RevertToken::new(
                self.host,
                handle,
                from,
                snapshot,
                self.phases,
            )));
        }

        tracing::info!(
            from = %label(self.host.as_ref(), from),
            to = %label(self.host.as_ref(), handle),
            "switched workspace"
        );
        self.phases.advance(TransitionPhase::UnloadingOld);
        let unload = self.host.begin_unload(from);
        let wait = self.flags.contains(TransitionFlags::WAIT_UNLOAD);
        finish_unload(&self.host, unload, wait, self.phases).await;
        Ok(TransitionOutcome::Switched(handle))
    }

    async fn activate_new(&mut self) -> Result<WorkspaceHandle> {
        let handle = self.load.finalize_with_progress(self.sink.take()).await?;
        self.phases.advance(TransitionPhase::ActivatingNew);
        if self.flags.contains(TransitionFlags::CHANGE_ACTIVE) {
            activate_workspace(self.host.as_ref(), handle)?;
        }
        Ok(handle)
    }
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.phases.id())
            .field("target", &self.load.target())
            .field("from", &self.from)
            .field("flags", &self.flags)
            .field("phase", &self.phases.phase())
            .finish()
    }
}

/// Wait for (or hook onto) an outgoing unload, then reclaim
///
/// Reclamation is requested exactly once either way.
pub(crate) async fn finish_unload(host: &SharedHost, unload: AsyncOperation, wait: bool, mut phases: PhaseTracker) {
    if wait {
        unload.wait().await;
        reclaim(host.as_ref(), &mut phases);
    } else {
        let host = Arc::clone(host);
        unload.on_completed(move || reclaim(host.as_ref(), &mut phases));
    }
}

fn reclaim(host: &dyn crate::host::WorkspaceHost, phases: &mut PhaseTracker) {
    phases.advance(TransitionPhase::Reclaiming);
    host.reclaim_unused_resources();
    phases.advance(TransitionPhase::Done);
}
