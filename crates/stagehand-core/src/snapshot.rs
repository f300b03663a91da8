//! Active object snapshots
//!
//! Records which root objects of a workspace were active, deactivating all of
//! them in the same step, so they can be brought back exactly as they were.

use crate::host::WorkspaceHost;
use crate::types::{ObjectRef, WorkspaceHandle};

/// The root objects that were active in a workspace at capture time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveObjectSnapshot {
    owner: WorkspaceHandle,
    objects: Vec<ObjectRef>,
}

impl ActiveObjectSnapshot {
    /// Snapshot-and-deactivate every root object of `workspace`
    ///
    /// Only objects that were active are recorded, in root order. Every root
    /// object is inactive afterwards.
    pub fn capture_and_deactivate(host: &dyn WorkspaceHost, workspace: WorkspaceHandle) -> Self {
        let mut objects = Vec::new();
        for object in host.root_objects(workspace) {
            if host.is_object_active(object) {
                objects.push(object);
            }
            host.set_object_active(object, false);
        }

        tracing::trace!(workspace = %workspace, recorded = objects.len(), "captured active objects");
        Self {
            owner: workspace,
            objects,
        }
    }

    /// Workspace the snapshot was taken from
    pub fn owner(&self) -> WorkspaceHandle {
        self.owner
    }

    /// Recorded objects, in capture order
    pub fn objects(&self) -> &[ObjectRef] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Re-enable exactly the recorded objects
    ///
    /// Objects destroyed since the capture are skipped.
    pub fn reactivate(self, host: &dyn WorkspaceHost) {
        for object in self.objects {
            if host.is_object_alive(object) {
                host.set_object_active(object, true);
            }
        }
    }
}
