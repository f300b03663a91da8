//! Preload registry
//!
//! Lets callers start loading workspaces before they are needed. The registry
//! keeps at most one pending [`DeferredLoad`] per identifier, in insertion
//! order.
//!
//! Only the most recently requested target is ever activated. When an entry
//! is consumed through [`PreloadRegistry::claim`] or [`PreloadRegistry::load`],
//! every entry inserted before it is stale: its gate is opened, and as soon as
//! it finishes loading, the workspace that load produced has its root objects
//! deactivated and is unloaded. Other loaded copies of the same workspace are
//! left alone.
//! Stale entries are unloaded even if the caller would have wanted one of them
//! later.
//!
//! A load cannot be aborted, so [`PreloadRegistry::cancel`] also lets the
//! entry finish and then unloads it.

use crate::deferred::DeferredLoad;
use crate::error::Result;
use crate::host::{activate_workspace, label, SharedHost, WorkspaceHost};
use crate::progress::SharedProgressSink;
use crate::types::WorkspaceHandle;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Insertion-ordered cache of pending preloads
pub struct PreloadRegistry {
    host: SharedHost,
    entries: Mutex<IndexMap<String, DeferredLoad>>,
}

impl PreloadRegistry {
    /// Create an empty registry loading through `host`
    pub fn new(host: SharedHost) -> Self {
        Self {
            host,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Start preloading `id` with its gate closed
    ///
    /// A second `create` for a pending identifier is a no-op; returns whether
    /// a new entry was created.
    pub fn create(&self, id: &str) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(id) {
            tracing::trace!(id, "preload already pending");
            return false;
        }
        entries.insert(id.to_string(), DeferredLoad::begin(&self.host, id));
        tracing::debug!(id, pending = entries.len(), "preload created");
        true
    }

    /// Remove and return the pending entry for `id`
    pub fn pop(&self, id: &str) -> Option<DeferredLoad> {
        self.entries.lock().shift_remove(id)
    }

    /// Whether `id` has a pending entry
    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Pending identifiers in insertion order
    pub fn pending_ids(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Take `id` as the load target, flushing every older entry
    ///
    /// Creates the entry first if it does not exist, in which case every
    /// pending entry is older. Entries up to and including `id` leave the
    /// registry. The flush runs from completion callbacks and never delays the
    /// returned load.
    pub fn claim(&self, id: &str) -> DeferredLoad {
        let (stale, target) = {
            let mut entries = self.entries.lock();
            match entries.get_index_of(id) {
                Some(position) => {
                    let stale: Vec<DeferredLoad> = entries.drain(..position).map(|(_, load)| load).collect();
                    let target = entries.shift_remove_index(0).map(|(_, load)| load);
                    (stale, target)
                }
                None => (entries.drain(..).map(|(_, load)| load).collect(), None),
            }
        };

        let target = target.unwrap_or_else(|| DeferredLoad::begin(&self.host, id));
        if !stale.is_empty() {
            tracing::debug!(id, stale = stale.len(), "flushing superseded preloads");
            self.flush(stale);
        }
        target
    }

    /// Claim `id` only if it has a pending entry
    ///
    /// Flushes the entries older than it like [`claim`](Self::claim). Returns
    /// `None` and leaves the registry untouched when `id` is not pending.
    pub fn claim_pending(&self, id: &str) -> Option<DeferredLoad> {
        let (stale, target) = {
            let mut entries = self.entries.lock();
            let position = entries.get_index_of(id)?;
            let stale: Vec<DeferredLoad> = entries.drain(..position).map(|(_, load)| load).collect();
            (stale, entries.shift_remove_index(0).map(|(_, load)| load))
        };

        if !stale.is_empty() {
            tracing::debug!(id, stale = stale.len(), "flushing superseded preloads");
            self.flush(stale);
        }
        target
    }

    /// Claim `id`, finalize it and make it the active workspace
    pub async fn load(&self, id: &str, sink: Option<SharedProgressSink>) -> Result<WorkspaceHandle> {
        let mut target = self.claim(id);
        let handle = target.finalize_with_progress(sink).await?;
        activate_workspace(self.host.as_ref(), handle)?;
        tracing::info!(id, workspace = %label(self.host.as_ref(), handle), "preloaded workspace activated");
        Ok(handle)
    }

    /// Drop the pending entry for `id`; it still loads, then unloads
    pub fn cancel(&self, id: &str) -> bool {
        match self.pop(id) {
            Some(load) => {
                self.flush(vec![load]);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending entry
    pub fn clear(&self) {
        let stale: Vec<DeferredLoad> = self.entries.lock().drain(..).map(|(_, load)| load).collect();
        if !stale.is_empty() {
            self.flush(stale);
        }
    }

    /// Let `stale` loads finish, then deactivate and unload them
    ///
    /// Reclamation is requested once, after the last of their unloads
    /// completes.
    fn flush(&self, stale: Vec<DeferredLoad>) {
        let remaining = Arc::new(AtomicUsize::new(stale.len()));

        for load in stale {
            let host = Arc::clone(&self.host);
            let remaining = Arc::clone(&remaining);
            tracing::debug!(load = %load.target(), "discarding superseded preload");
            load.discard_with(move || release(host.as_ref(), &remaining));
        }
    }
}

/// Count down one flushed entry, reclaiming after the last
fn release(host: &dyn WorkspaceHost, remaining: &AtomicUsize) {
    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
        tracing::debug!("superseded preloads drained");
        host.reclaim_unused_resources();
    }
}

impl std::fmt::Debug for PreloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadRegistry")
            .field("pending", &self.pending_ids())
            .finish()
    }
}
