//! Transition engine
//!
//! Owns the injected host and preload registry and hands out prepared
//! [`Transition`]s. Reload is driven directly since it never yields a token.

use super::{finish_unload, Transition, TransitionFlags};
use crate::config::TransitionConfig;
use crate::deferred::DeferredLoad;
use crate::error::{Result, StagehandError};
use crate::events::{PhaseTracker, TransitionEvent, TransitionId, TransitionPhase};
use crate::host::{activate_workspace, deactivate_roots, label, SharedHost};
use crate::operation::AsyncOperation;
use crate::preload::PreloadRegistry;
use crate::progress::SharedProgressSink;
use crate::types::{LoadMode, LoadTarget, WorkspaceHandle};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Entry point for workspace transitions
pub struct TransitionEngine {
    host: SharedHost,
    registry: Arc<PreloadRegistry>,
    config: TransitionConfig,
    events: Option<Sender<TransitionEvent>>,
    next_id: AtomicU64,
}

impl TransitionEngine {
    pub fn new(host: SharedHost, registry: Arc<PreloadRegistry>, config: TransitionConfig) -> Self {
        Self {
            host,
            registry,
            config,
            events: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Publish phase changes to `sender`
    pub fn with_events(mut self, sender: Sender<TransitionEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn host(&self) -> &SharedHost {
        &self.host
    }

    pub fn registry(&self) -> &Arc<PreloadRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &TransitionConfig {
        &self.config
    }

    /// Flags every transition starts from
    fn default_flags(&self) -> TransitionFlags {
        let mut flags = TransitionFlags::empty();
        flags.set(TransitionFlags::WITH_PRELOAD, self.config.use_preloads);
        flags.set(TransitionFlags::WAIT_UNLOAD, self.config.wait_unload);
        flags
    }

    fn tracker(&self, label: impl Into<String>) -> PhaseTracker {
        let id = TransitionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        PhaseTracker::new(id, label, self.events.clone())
    }

    /// Prepare a transition with explicit flags
    ///
    /// Starts loading `id` with its gate closed. With `WITH_PRELOAD` set, a
    /// pending preload for `id` is claimed instead, flushing the entries
    /// older than it; without a matching entry the registry is untouched.
    /// `from` is the workspace to leave, or `None` to load alongside the
    /// current ones.
    pub fn prepare(&self, id: &str, from: Option<WorkspaceHandle>, flags: TransitionFlags) -> Transition {
        let mut phases = self.tracker(id);
        let claimed = if flags.contains(TransitionFlags::WITH_PRELOAD) {
            self.registry.claim_pending(id)
        } else {
            None
        };
        let load = claimed.unwrap_or_else(|| DeferredLoad::begin(&self.host, id));
        phases.advance(TransitionPhase::Loading);
        tracing::debug!(transition = %phases.id(), id, ?flags, "transition prepared");

        Transition::new(Arc::clone(&self.host), load, from, flags, phases)
    }

    /// Load `id` next to the existing workspaces
    pub fn add(&self, id: &str, change_active: bool) -> Transition {
        let mut flags = self.default_flags();
        flags.set(TransitionFlags::CHANGE_ACTIVE, change_active);
        self.prepare(id, None, flags)
    }

    /// Replace `from` with `id`, unloading `from`
    pub fn switch(&self, id: &str, from: WorkspaceHandle) -> Transition {
        self.prepare(id, Some(from), self.default_flags() | TransitionFlags::CHANGE_ACTIVE)
    }

    /// Replace `from` with `id`, keeping `from` loaded for a revert
    pub fn switch_with_revertable(&self, id: &str, from: WorkspaceHandle) -> Transition {
        let flags = self.default_flags() | TransitionFlags::CHANGE_ACTIVE | TransitionFlags::WITH_REVERT;
        self.prepare(id, Some(from), flags)
    }

    /// Reload the content of `scene` and make the result active
    ///
    /// Loads in place when `scene` is the only loaded workspace and in-place
    /// reloads are enabled, otherwise unloads it first and loads again.
    pub async fn reload(&self, scene: WorkspaceHandle, sink: Option<SharedProgressSink>) -> Result<WorkspaceHandle> {
        let index = self
            .host
            .build_index(scene)
            .ok_or_else(|| StagehandError::resolution(scene.to_string()))?;
        let target = LoadTarget::Index(index);
        let mut phases = self.tracker(target.identifier());
        let in_place = self.config.in_place_reload && self.host.loaded_count() == 1;

        tracing::info!(workspace = %label(self.host.as_ref(), scene), in_place, "reloading workspace");

        let mut load = if in_place {
            phases.advance(TransitionPhase::Loading);
            DeferredLoad::begin_target(&self.host, target, LoadMode::Single)
        } else {
            phases.advance(TransitionPhase::DeactivatingOld);
            deactivate_roots(self.host.as_ref(), scene);
            phases.advance(TransitionPhase::UnloadingOld);
            self.host.begin_unload(scene).wait().await;
            phases.advance(TransitionPhase::Loading);
            DeferredLoad::begin_target(&self.host, target, LoadMode::Additive)
        };

        let handle = load.finalize_with_progress(sink).await?;
        phases.advance(TransitionPhase::ActivatingNew);
        activate_workspace(self.host.as_ref(), handle)?;

        // The outgoing workspace is already gone; reclaim right away.
        finish_unload(&self.host, AsyncOperation::completed(), true, phases).await;
        Ok(handle)
    }
}

impl std::fmt::Debug for TransitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionEngine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("events", &self.events.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryHost, WorkspaceDefinition};

    fn setup(config: TransitionConfig) -> TransitionEngine {
        let host: SharedHost = Arc::new(MemoryHost::new(vec![
            WorkspaceDefinition::new("A", &["Root"]),
            WorkspaceDefinition::new("B", &["Root"]),
        ]));
        let registry = Arc::new(PreloadRegistry::new(Arc::clone(&host)));
        TransitionEngine::new(host, registry, config)
    }

    #[test]
    fn test_default_flags_follow_config() {
        let engine = setup(TransitionConfig::default());
        let switch = engine.switch("B", WorkspaceHandle::new(1));
        assert_eq!(
            switch.flags(),
            TransitionFlags::WITH_PRELOAD | TransitionFlags::WAIT_UNLOAD | TransitionFlags::CHANGE_ACTIVE
        );

        let engine = setup(TransitionConfig {
            wait_unload: false,
            use_preloads: false,
            ..TransitionConfig::default()
        });
        let add = engine.add("A", false);
        assert_eq!(add.flags(), TransitionFlags::empty());
        assert!(engine
            .switch_with_revertable("B", WorkspaceHandle::new(1))
            .flags()
            .contains(TransitionFlags::WITH_REVERT));
    }

    #[test]
    fn test_prepare_starts_loading() {
        let engine = setup(TransitionConfig::default());
        let first = engine.add("A", true);
        let second = engine.add("B", true).wait_unload(false);

        assert_eq!(first.phase(), TransitionPhase::Loading);
        assert_eq!(first.target(), "A");
        assert!(second.id() > first.id());
        assert!(!second.flags().contains(TransitionFlags::WAIT_UNLOAD));
    }

    #[test]
    fn test_prepare_claims_preload() {
        let engine = setup(TransitionConfig::default());
        engine.registry().create("A");
        engine.registry().create("B");

        let _transition = engine.add("B", true);
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_prepare_leaves_unrelated_preloads() {
        let engine = setup(TransitionConfig::default());
        engine.registry().create("A");

        let _transition = engine.add("B", true);
        assert_eq!(engine.registry().pending_ids(), vec!["A"]);
    }
}
