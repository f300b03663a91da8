//! Scripted transition session
//!
//! Drives a [`TransitionEngine`] over a [`MemoryHost`] one [`Step`] at a time,
//! tracking the current workspace and any pending revert token.

use crate::error::DriverError;
use crate::script::Step;
use parking_lot::Mutex;
use stagehand_core::{
    EventBus, MemoryHost, PreloadRegistry, ProgressSink, RevertToken, SharedHost, SharedProgressSink,
    StagehandConfig, TransitionConfig, TransitionEngine, TransitionEvent, WorkspaceHandle, WorkspaceHost,
};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Scheduler ticks granted to fire-and-forget unloads after the last step
const SETTLE_TICKS: usize = 32;

/// Prints a step's load progress in quarter increments
struct ProgressLine {
    label: String,
    last_quarter: Mutex<i32>,
}

impl ProgressLine {
    fn new(label: String) -> Self {
        Self {
            label,
            last_quarter: Mutex::new(-1),
        }
    }
}

impl ProgressSink for ProgressLine {
    fn report(&self, progress: f32) {
        let quarter = (progress.clamp(0.0, 1.0) * 4.0).floor() as i32;
        let mut last = self.last_quarter.lock();
        if quarter > *last {
            *last = quarter;
            println!("  {:<24} {:>3}%", self.label, quarter * 25);
        }
    }
}

/// End state of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub loaded: Vec<String>,
    pub active: Option<String>,
    pub pending_preloads: Vec<String>,
    pub reclaims: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "loaded:   {}", self.loaded.join(", "))?;
        writeln!(f, "active:   {}", self.active.as_deref().unwrap_or("-"))?;
        writeln!(f, "preloads: {}", self.pending_preloads.join(", "))?;
        write!(f, "reclaims: {}", self.reclaims)
    }
}

/// A running host plus the engine driving it
pub struct Session {
    host: Arc<MemoryHost>,
    engine: TransitionEngine,
    bus: EventBus,
    pump: JoinHandle<()>,
    current: Option<WorkspaceHandle>,
    pending: Option<RevertToken>,
    show_progress: bool,
}

impl Session {
    /// Build the host from the config catalog and start pumping it
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &StagehandConfig) -> Self {
        let host = Arc::new(MemoryHost::new(config.catalog.clone()));
        let shared: SharedHost = host.clone();
        let registry = Arc::new(PreloadRegistry::new(Arc::clone(&shared)));
        let bus = EventBus::new(config.transitions.event_capacity);
        let engine = TransitionEngine::new(shared, registry, config.transitions.clone()).with_events(bus.sender());
        let pump = host.spawn_pump();

        Self {
            host,
            engine,
            bus,
            pump,
            current: None,
            pending: None,
            show_progress: false,
        }
    }

    /// Print load progress while steps run
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn host(&self) -> &Arc<MemoryHost> {
        &self.host
    }

    /// Workspace the next switch or reload starts from
    pub fn current(&self) -> Option<WorkspaceHandle> {
        self.current
    }

    pub fn has_pending_revert(&self) -> bool {
        self.pending.is_some()
    }

    fn defaults(&self) -> &TransitionConfig {
        self.engine.config()
    }

    fn sink(&self, step: &Step) -> Option<SharedProgressSink> {
        self.show_progress
            .then(|| Arc::new(ProgressLine::new(step.to_string())) as SharedProgressSink)
    }

    fn require_current(&self, step: &Step) -> Result<WorkspaceHandle, DriverError> {
        self.current
            .ok_or_else(|| DriverError::NoCurrentWorkspace(step.to_string()))
    }

    fn require_settled(&self) -> Result<(), DriverError> {
        if self.pending.is_some() {
            return Err(DriverError::RevertPending);
        }
        Ok(())
    }

    /// Run one step to completion
    pub async fn run(&mut self, step: &Step) -> Result<(), DriverError> {
        tracing::debug!(%step, "running step");
        match step {
            Step::Preload(id) => {
                let created = self.engine.registry().create(id);
                tracing::info!(id = %id, created, "preload requested");
            }
            Step::Load(id) => {
                self.require_settled()?;
                let handle = self.engine.registry().load(id, self.sink(step)).await?;
                self.current = Some(handle);
            }
            Step::Add(id) => {
                // Only the first workspace becomes active on its own.
                let change_active = self.current.is_none();
                let mut transition = self.engine.add(id, change_active);
                if let Some(sink) = self.sink(step) {
                    transition = transition.with_progress(sink);
                }
                let handle = transition.execute().await?.handle();
                if change_active {
                    self.current = Some(handle);
                }
            }
            Step::Switch { id, wait_unload } => {
                self.require_settled()?;
                let from = self.require_current(step)?;
                let mut transition = self.engine.switch(id, from).wait_unload(*wait_unload);
                if let Some(sink) = self.sink(step) {
                    transition = transition.with_progress(sink);
                }
                self.current = Some(transition.execute().await?.handle());
            }
            Step::Revertable(id) => {
                self.require_settled()?;
                let from = self.require_current(step)?;
                let mut transition = self.engine.switch_with_revertable(id, from);
                if let Some(sink) = self.sink(step) {
                    transition = transition.with_progress(sink);
                }
                let outcome = transition.execute().await?;
                self.current = Some(outcome.handle());
                self.pending = outcome.into_revert_token();
            }
            Step::Revert => {
                let token = self.pending.take().ok_or(DriverError::NoRevertToken("revert"))?;
                let restored = token.to_activate();
                token.revert(self.defaults().revert_wait_unload).await?;
                self.current = Some(restored);
            }
            Step::Commit => {
                let token = self.pending.take().ok_or(DriverError::NoRevertToken("commit"))?;
                token.commit(self.defaults().wait_unload).await;
            }
            Step::Reload => {
                self.require_settled()?;
                let scene = self.require_current(step)?;
                self.current = Some(self.engine.reload(scene, self.sink(step)).await?);
            }
        }
        Ok(())
    }

    /// Phase events published since the last drain
    pub fn drain_events(&self) -> Vec<TransitionEvent> {
        self.bus.drain(usize::MAX)
    }

    /// Let outstanding unloads and their reclamation finish
    pub async fn settle(&self) {
        for _ in 0..SETTLE_TICKS {
            tokio::task::yield_now().await;
        }
    }

    pub fn summary(&self) -> Summary {
        Summary {
            loaded: self.host.loaded_names(),
            active: self.host.active_workspace().and_then(|h| self.host.name(h)),
            pending_preloads: self.engine.registry().pending_ids(),
            reclaims: self.host.reclaim_count(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
