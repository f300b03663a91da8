//! Host collaborator interface
//!
//! The host owns the real content loader, the loaded workspaces and the
//! active-workspace pointer. The orchestrator only talks to it through
//! [`WorkspaceHost`].

use crate::error::{Result, StagehandError};
use crate::operation::AsyncOperation;
use crate::types::{LoadMode, LoadTarget, ObjectRef, WorkspaceHandle};
use std::sync::Arc;

/// Shared host reference handed to every orchestrator component
pub type SharedHost = Arc<dyn WorkspaceHost>;

/// Operations the orchestrator consumes from the host
///
/// Loads and unloads are assumed not to fail; fallibility of the content
/// loader itself is the host's concern.
pub trait WorkspaceHost: Send + Sync {
    /// Begin loading content
    ///
    /// The returned operation starts with its activation gate open; callers
    /// that want to defer finalization close it immediately. Hosts should
    /// finish it with [`AsyncOperation::complete_with`] so callers get the
    /// exact workspace instead of resolving by identifier.
    fn begin_load(&self, target: &LoadTarget, mode: LoadMode) -> AsyncOperation;

    /// Begin unloading a workspace
    fn begin_unload(&self, handle: WorkspaceHandle) -> AsyncOperation;

    /// Top-level objects of a workspace, in host order
    fn root_objects(&self, handle: WorkspaceHandle) -> Vec<ObjectRef>;

    /// Whether an object is active itself
    fn is_object_active(&self, object: ObjectRef) -> bool;

    /// Activate or deactivate an object
    fn set_object_active(&self, object: ObjectRef, active: bool);

    /// Whether an object still exists
    fn is_object_alive(&self, object: ObjectRef) -> bool;

    /// The current active workspace, if any
    fn active_workspace(&self) -> Option<WorkspaceHandle>;

    /// Make a workspace the active one. Returns `false` if the host refused.
    fn set_active_workspace(&self, handle: WorkspaceHandle) -> bool;

    /// Hint the host to free resources no loaded workspace references
    fn reclaim_unused_resources(&self);

    /// Resolve a loaded workspace by name; `None` if absent or ambiguous
    fn resolve_by_name(&self, name: &str) -> Option<WorkspaceHandle>;

    /// Resolve a loaded workspace by path-style identifier
    fn resolve_by_path(&self, path: &str) -> Option<WorkspaceHandle>;

    /// Resolve a loaded workspace by build index
    fn resolve_by_index(&self, index: usize) -> Option<WorkspaceHandle>;

    /// Whether the handle still refers to a loaded workspace
    fn is_valid(&self, handle: WorkspaceHandle) -> bool;

    /// Number of loaded workspaces
    fn loaded_count(&self) -> usize;

    /// Build index of a loaded workspace
    fn build_index(&self, handle: WorkspaceHandle) -> Option<usize>;

    /// Human-readable workspace name, for logging
    fn name(&self, handle: WorkspaceHandle) -> Option<String>;
}

/// Resolve a freshly loaded target back to its handle
///
/// Names are tried first, falling back to a path lookup when the name is
/// unknown or shared by several loaded workspaces.
pub fn resolve_loaded_workspace(host: &dyn WorkspaceHost, target: &LoadTarget) -> Result<WorkspaceHandle> {
    let resolved = match target {
        LoadTarget::Name(identifier) => host
            .resolve_by_name(identifier)
            .or_else(|| host.resolve_by_path(identifier)),
        LoadTarget::Index(index) => host.resolve_by_index(*index),
    };

    resolved
        .filter(|handle| host.is_valid(*handle))
        .ok_or_else(|| StagehandError::resolution(target.identifier()))
}

/// Deactivate every root object of a workspace
pub(crate) fn deactivate_roots(host: &dyn WorkspaceHost, handle: WorkspaceHandle) {
    for object in host.root_objects(handle) {
        host.set_object_active(object, false);
    }
}

/// Point the host at `handle`, failing if it refuses
pub(crate) fn activate_workspace(host: &dyn WorkspaceHost, handle: WorkspaceHandle) -> Result<()> {
    if host.set_active_workspace(handle) {
        Ok(())
    } else {
        Err(StagehandError::ActivationRejected(handle))
    }
}

/// Log label for a handle
pub(crate) fn label(host: &dyn WorkspaceHost, handle: WorkspaceHandle) -> String {
    match host.name(handle) {
        Some(name) => format!("{}{}", name, handle),
        None => handle.to_string(),
    }
}
