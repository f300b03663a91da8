//! Gated workspace loads
//!
//! A [`DeferredLoad`] starts loading as soon as it is created but keeps its
//! activation gate closed, so none of the loaded content becomes visible until
//! [`DeferredLoad::finalize`] is called.
//!
//! A load cannot be aborted. Dropping a `DeferredLoad` that was never
//! finalized opens its gate, and once the load finishes its root objects are
//! deactivated and the workspace is unloaded again.

use crate::error::{Result, StagehandError};
use crate::host::{deactivate_roots, label, resolve_loaded_workspace, SharedHost};
use crate::operation::AsyncOperation;
use crate::progress::{ProgressAggregator, SharedProgressSink};
use crate::types::{LoadMode, LoadTarget, WorkspaceHandle};
use std::sync::Arc;

/// Finalization state of a deferred load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Pending,
    Finalizing,
    Finalized(WorkspaceHandle),
    Failed,
    Discarded,
}

/// A load whose finalization is explicitly gated
pub struct DeferredLoad {
    host: SharedHost,
    target: LoadTarget,
    operation: AsyncOperation,
    state: LoadState,
}

impl DeferredLoad {
    /// Begin loading `identifier` additively with the gate closed
    pub fn begin(host: &SharedHost, identifier: impl Into<String>) -> Self {
        Self::begin_target(host, LoadTarget::Name(identifier.into()), LoadMode::Additive)
    }

    /// Begin loading an arbitrary target with the gate closed
    pub fn begin_target(host: &SharedHost, target: LoadTarget, mode: LoadMode) -> Self {
        let operation = host.begin_load(&target, mode);
        operation.set_allow_activation(false);
        tracing::debug!(load = %target, ?mode, "deferred load started");

        Self {
            host: Arc::clone(host),
            target,
            operation,
            state: LoadState::Pending,
        }
    }

    /// Identifier being loaded
    pub fn identifier(&self) -> String {
        self.target.identifier()
    }

    /// Load target
    pub fn target(&self) -> &LoadTarget {
        &self.target
    }

    /// Current load progress in `[0, 1]`
    pub fn progress(&self) -> f32 {
        self.operation.progress()
    }

    /// Whether the underlying load has completed
    pub fn is_done(&self) -> bool {
        self.operation.is_done()
    }

    /// Underlying host operation, for progress reporting
    pub fn operation(&self) -> &AsyncOperation {
        &self.operation
    }

    /// Whether `finalize` has been called
    pub fn is_finalized(&self) -> bool {
        self.state != LoadState::Pending
    }

    /// Handle produced by a successful finalization
    pub fn result(&self) -> Option<WorkspaceHandle> {
        match self.state {
            LoadState::Finalized(handle) => Some(handle),
            _ => None,
        }
    }

    /// Open the activation gate without waiting for completion
    pub fn allow_activation(&self) {
        self.operation.set_allow_activation(true);
    }

    /// Open the gate, wait for the load and resolve the loaded workspace
    pub async fn finalize(&mut self) -> Result<WorkspaceHandle> {
        self.finalize_with_progress(None).await
    }

    /// Like [`finalize`](Self::finalize), reporting progress to `sink` each tick
    pub async fn finalize_with_progress(&mut self, sink: Option<SharedProgressSink>) -> Result<WorkspaceHandle> {
        if self.state != LoadState::Pending {
            return Err(StagehandError::AlreadyFinalized(self.identifier()));
        }
        self.state = LoadState::Finalizing;

        self.allow_activation();
        if let Some(sink) = sink {
            ProgressAggregator::report(self.operation.clone(), sink);
        }
        self.operation.wait().await;

        let handle = match self.loaded_workspace() {
            Ok(handle) => handle,
            Err(err) => {
                self.state = LoadState::Failed;
                return Err(err);
            }
        };
        self.state = LoadState::Finalized(handle);
        tracing::debug!(load = %self.target, workspace = %handle, "deferred load finalized");
        Ok(handle)
    }

    /// Workspace the completed load produced
    ///
    /// The handle the host reported wins; identifier resolution is only the
    /// fallback for hosts that complete loads without one.
    fn loaded_workspace(&self) -> Result<WorkspaceHandle> {
        match self.operation.result() {
            Some(handle) if self.host.is_valid(handle) => Ok(handle),
            Some(_) => Err(StagehandError::resolution(self.identifier())),
            None => resolve_loaded_workspace(self.host.as_ref(), &self.target),
        }
    }

    /// Give the load up: let it finish, then deactivate and unload it
    ///
    /// `on_released` runs once the unload completes, or as soon as the load
    /// completes if it produced no workspace.
    pub(crate) fn discard_with<F>(mut self, on_released: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.state = LoadState::Discarded;
        release_when_loaded(&self.host, &self.operation, on_released);
    }
}

impl Drop for DeferredLoad {
    fn drop(&mut self) {
        if matches!(self.state, LoadState::Pending | LoadState::Finalizing) {
            tracing::debug!(load = %self.target, "deferred load dropped unfinalized");
            release_when_loaded(&self.host, &self.operation, || {});
        }
    }
}

/// Open the gate and unload whatever `operation` loads once it completes
///
/// Only the handle the host reported is unloaded. A load completed without
/// one is left alone.
fn release_when_loaded<F>(host: &SharedHost, operation: &AsyncOperation, on_released: F)
where
    F: FnOnce() + Send + 'static,
{
    let host = Arc::clone(host);
    let loaded = operation.clone();
    operation.on_completed(move || match loaded.result() {
        Some(handle) if host.is_valid(handle) => {
            deactivate_roots(host.as_ref(), handle);
            tracing::debug!(workspace = %label(host.as_ref(), handle), "unloading discarded load");
            host.begin_unload(handle).on_completed(on_released);
        }
        _ => {
            tracing::debug!("discarded load left nothing to unload");
            on_released();
        }
    });
    operation.set_allow_activation(true);
}

impl std::fmt::Debug for DeferredLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredLoad")
            .field("target", &self.target)
            .field("operation", &self.operation)
            .field("state", &self.state)
            .finish()
    }
}
