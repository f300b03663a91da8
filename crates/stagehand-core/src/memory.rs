//! In-memory workspace host
//!
//! A deterministic [`WorkspaceHost`] used by the CLI driver and the tests.
//! Workspaces come from a catalog of [`WorkspaceDefinition`]s; their build
//! index is their position in the catalog.
//!
//! Loading is stepped: every [`MemoryHost::step`] advances each pending load
//! by one step. A load whose activation gate is closed stalls at 0.9 progress
//! without holding back loads requested after it; loads that become ready in
//! the same step complete in request order. A finished load completes its
//! operation with the handle it produced. Unloads complete on the step after
//! they were requested.

use crate::host::WorkspaceHost;
use crate::operation::AsyncOperation;
use crate::types::{LoadMode, LoadTarget, ObjectRef, WorkspaceHandle};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Progress a load reports while waiting for its activation gate
const GATED_PROGRESS: f32 = 0.9;

/// A top-level object in a catalog workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDefinition {
    /// Object name
    pub name: String,

    /// Whether the object starts active when its workspace loads
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ObjectDefinition {
    pub fn active(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
        }
    }

    pub fn inactive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: false,
        }
    }
}

/// A loadable workspace in the host catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceDefinition {
    /// Workspace name
    pub name: String,

    /// Path-style identifier. Defaults to `workspaces/<name>`.
    #[serde(default)]
    pub path: Option<String>,

    /// Number of host steps a load takes
    #[serde(default = "default_load_steps")]
    pub load_steps: u32,

    /// Root objects, in root order
    #[serde(default)]
    pub objects: Vec<ObjectDefinition>,
}

fn default_load_steps() -> u32 {
    4
}

impl WorkspaceDefinition {
    /// Create a definition whose objects all start active
    pub fn new(name: impl Into<String>, objects: &[&str]) -> Self {
        Self::with_objects(name, objects.iter().map(|o| ObjectDefinition::active(*o)).collect())
    }

    /// Create a definition from explicit object definitions
    pub fn with_objects(name: impl Into<String>, objects: Vec<ObjectDefinition>) -> Self {
        Self {
            name: name.into(),
            path: None,
            load_steps: default_load_steps(),
            objects,
        }
    }

    /// Set the path-style identifier
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the number of steps a load takes
    pub fn with_load_steps(mut self, steps: u32) -> Self {
        self.load_steps = steps;
        self
    }

    /// Path used for path-style resolution
    pub fn effective_path(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("workspaces/{}", self.name))
    }
}

/// Host-side record of everything that happened, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    LoadRequested { target: LoadTarget, mode: LoadMode },
    Loaded { workspace: WorkspaceHandle, name: String },
    UnloadRequested { workspace: WorkspaceHandle },
    Unloaded { workspace: WorkspaceHandle },
    ObjectActivated { workspace: WorkspaceHandle, object: ObjectRef },
    ObjectDeactivated { workspace: WorkspaceHandle, object: ObjectRef },
    ActiveWorkspaceChanged { workspace: WorkspaceHandle },
    Reclaimed,
}

#[derive(Debug)]
struct LoadedWorkspace {
    handle: WorkspaceHandle,
    build_index: usize,
    name: String,
    path: String,
    objects: Vec<ObjectRef>,
}

#[derive(Debug)]
struct ObjectState {
    owner: WorkspaceHandle,
    active: bool,
    alive: bool,
}

#[derive(Debug)]
struct PendingLoad {
    definition: Option<usize>,
    mode: LoadMode,
    steps_taken: u32,
    steps_total: u32,
    operation: AsyncOperation,
}

#[derive(Debug)]
struct PendingUnload {
    handle: WorkspaceHandle,
    operation: AsyncOperation,
}

#[derive(Debug, Default)]
struct HostState {
    loaded: Vec<LoadedWorkspace>,
    objects: HashMap<ObjectRef, ObjectState>,
    active: Option<WorkspaceHandle>,
    loads: VecDeque<PendingLoad>,
    unloads: Vec<PendingUnload>,
    next_handle: u64,
    next_object: u64,
    journal: Vec<HostEvent>,
    reclaims: usize,
    peak_live: usize,
}

impl HostState {
    fn workspace(&self, handle: WorkspaceHandle) -> Option<&LoadedWorkspace> {
        self.loaded.iter().find(|ws| ws.handle == handle)
    }

    fn is_live(&self, workspace: &LoadedWorkspace) -> bool {
        workspace
            .objects
            .iter()
            .any(|o| self.objects.get(o).is_some_and(|s| s.alive && s.active))
    }

    fn live_count(&self) -> usize {
        self.loaded.iter().filter(|ws| self.is_live(ws)).count()
    }

    fn note_live(&mut self) {
        self.peak_live = self.peak_live.max(self.live_count());
    }

    fn instantiate(&mut self, catalog: &[WorkspaceDefinition], index: usize) -> WorkspaceHandle {
        let definition = &catalog[index];
        self.next_handle += 1;
        let handle = WorkspaceHandle::new(self.next_handle);

        let mut objects = Vec::with_capacity(definition.objects.len());
        for object in &definition.objects {
            self.next_object += 1;
            let object_ref = ObjectRef::new(self.next_object);
            self.objects.insert(
                object_ref,
                ObjectState {
                    owner: handle,
                    active: object.active,
                    alive: true,
                },
            );
            objects.push(object_ref);
        }

        self.loaded.push(LoadedWorkspace {
            handle,
            build_index: index,
            name: definition.name.clone(),
            path: definition.effective_path(),
            objects,
        });
        self.journal.push(HostEvent::Loaded {
            workspace: handle,
            name: definition.name.clone(),
        });
        tracing::trace!(workspace = %handle, name = %definition.name, "memory host loaded workspace");

        if self.active.is_none() {
            self.set_active(handle);
        }
        self.note_live();
        handle
    }

    fn remove(&mut self, handle: WorkspaceHandle) {
        let Some(position) = self.loaded.iter().position(|ws| ws.handle == handle) else {
            return;
        };
        let workspace = self.loaded.remove(position);
        for object in &workspace.objects {
            if let Some(state) = self.objects.get_mut(object) {
                state.alive = false;
                state.active = false;
            }
        }
        self.journal.push(HostEvent::Unloaded { workspace: handle });
        tracing::trace!(workspace = %handle, "memory host unloaded workspace");

        if self.active == Some(handle) {
            self.active = None;
            if let Some(next) = self.loaded.first().map(|ws| ws.handle) {
                self.set_active(next);
            }
        }
    }

    fn set_active(&mut self, handle: WorkspaceHandle) {
        self.active = Some(handle);
        self.journal
            .push(HostEvent::ActiveWorkspaceChanged { workspace: handle });
    }
}

/// Deterministic in-memory host
pub struct MemoryHost {
    catalog: Vec<WorkspaceDefinition>,
    state: Mutex<HostState>,
}

impl MemoryHost {
    /// Create a host over a catalog; nothing is loaded yet
    pub fn new(catalog: Vec<WorkspaceDefinition>) -> Self {
        Self {
            catalog,
            state: Mutex::new(HostState::default()),
        }
    }

    /// Catalog this host loads from
    pub fn catalog(&self) -> &[WorkspaceDefinition] {
        &self.catalog
    }

    /// Find the catalog entry for a load target
    ///
    /// Names shared by several entries are ambiguous and only match by path.
    fn definition_for(&self, target: &LoadTarget) -> Option<usize> {
        match target {
            LoadTarget::Index(index) => (*index < self.catalog.len()).then_some(*index),
            LoadTarget::Name(identifier) => {
                let mut by_name = self
                    .catalog
                    .iter()
                    .enumerate()
                    .filter(|(_, d)| d.name == *identifier);
                match (by_name.next(), by_name.next()) {
                    (Some((index, _)), None) => Some(index),
                    _ => self
                        .catalog
                        .iter()
                        .position(|d| d.effective_path() == *identifier),
                }
            }
        }
    }

    /// Load a workspace synchronously, bypassing the load queue
    ///
    /// Becomes the active workspace if none is active yet.
    pub fn load_immediately(&self, identifier: &str) -> Option<WorkspaceHandle> {
        let index = self.definition_for(&LoadTarget::Name(identifier.to_string()))?;
        let mut state = self.state.lock();
        Some(state.instantiate(&self.catalog, index))
    }

    /// Advance every pending operation by one step
    pub fn step(&self) {
        let mut finished: Vec<(AsyncOperation, Option<WorkspaceHandle>)> = Vec::new();
        {
            let mut state = self.state.lock();

            for unload in std::mem::take(&mut state.unloads) {
                state.remove(unload.handle);
                state.note_live();
                finished.push((unload.operation, None));
            }

            let mut waiting = VecDeque::new();
            while let Some(mut load) = state.loads.pop_front() {
                if load.steps_taken < load.steps_total {
                    load.steps_taken += 1;
                    let ratio = load.steps_taken as f32 / load.steps_total as f32;
                    load.operation.set_progress(ratio * GATED_PROGRESS);
                }

                let ready = load.steps_taken >= load.steps_total && load.operation.allow_activation();
                if ready {
                    let mut loaded = None;
                    if let Some(index) = load.definition {
                        if load.mode == LoadMode::Single {
                            let others: Vec<_> = state.loaded.iter().map(|ws| ws.handle).collect();
                            for handle in others {
                                state.remove(handle);
                            }
                        }
                        let handle = state.instantiate(&self.catalog, index);
                        if load.mode == LoadMode::Single && state.active != Some(handle) {
                            state.set_active(handle);
                        }
                        loaded = Some(handle);
                    }
                    finished.push((load.operation, loaded));
                } else {
                    waiting.push_back(load);
                }
            }
            state.loads = waiting;
        }

        // Completion callbacks may call back into the host.
        for (operation, loaded) in finished {
            match loaded {
                Some(handle) => operation.complete_with(handle),
                None => operation.complete(),
            }
        }
    }

    /// Spawn a task that steps the host once per scheduler tick
    pub fn spawn_pump(self: &Arc<Self>) -> JoinHandle<()> {
        let host = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                host.step();
                tokio::task::yield_now().await;
            }
        })
    }

    /// Number of loads and unloads still in flight
    pub fn pending_operations(&self) -> usize {
        let state = self.state.lock();
        state.loads.len() + state.unloads.len()
    }

    /// Loaded workspaces, in load order
    pub fn loaded(&self) -> Vec<WorkspaceHandle> {
        self.state.lock().loaded.iter().map(|ws| ws.handle).collect()
    }

    /// Names of the loaded workspaces, in load order
    pub fn loaded_names(&self) -> Vec<String> {
        self.state.lock().loaded.iter().map(|ws| ws.name.clone()).collect()
    }

    /// Loaded workspaces with at least one active root object
    pub fn live_workspaces(&self) -> Vec<WorkspaceHandle> {
        let state = self.state.lock();
        state
            .loaded
            .iter()
            .filter(|ws| state.is_live(ws))
            .map(|ws| ws.handle)
            .collect()
    }

    /// Highest number of simultaneously live workspaces observed
    pub fn peak_live_workspaces(&self) -> usize {
        self.state.lock().peak_live
    }

    /// Restart peak tracking from the current state
    pub fn reset_peak(&self) {
        let mut state = self.state.lock();
        state.peak_live = state.live_count();
    }

    /// Find a root object of a workspace by name
    pub fn find_object(&self, handle: WorkspaceHandle, name: &str) -> Option<ObjectRef> {
        let state = self.state.lock();
        let workspace = state.workspace(handle)?;
        let definition = self.catalog.get(workspace.build_index)?;
        definition
            .objects
            .iter()
            .position(|o| o.name == name)
            .and_then(|i| workspace.objects.get(i).copied())
    }

    /// Destroy an object; it stays dead even if reactivated
    pub fn destroy_object(&self, object: ObjectRef) {
        let mut state = self.state.lock();
        if let Some(s) = state.objects.get_mut(&object) {
            s.alive = false;
            s.active = false;
        }
    }

    /// Every host event so far
    pub fn journal(&self) -> Vec<HostEvent> {
        self.state.lock().journal.clone()
    }

    /// Forget recorded host events
    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    /// How many times reclamation was requested
    pub fn reclaim_count(&self) -> usize {
        self.state.lock().reclaims
    }
}

impl WorkspaceHost for MemoryHost {
    fn begin_load(&self, target: &LoadTarget, mode: LoadMode) -> AsyncOperation {
        let definition = self.definition_for(target);
        let operation = AsyncOperation::new();
        let steps_total = definition
            .map(|i| self.catalog[i].load_steps.max(1))
            .unwrap_or(1);

        let mut state = self.state.lock();
        state.journal.push(HostEvent::LoadRequested {
            target: target.clone(),
            mode,
        });
        state.loads.push_back(PendingLoad {
            definition,
            mode,
            steps_taken: 0,
            steps_total,
            operation: operation.clone(),
        });
        tracing::trace!(load = %target, ?mode, known = definition.is_some(), "memory host load requested");
        operation
    }

    fn begin_unload(&self, handle: WorkspaceHandle) -> AsyncOperation {
        let operation = AsyncOperation::new();
        let mut state = self.state.lock();
        state
            .journal
            .push(HostEvent::UnloadRequested { workspace: handle });
        state.unloads.push(PendingUnload {
            handle,
            operation: operation.clone(),
        });
        operation
    }

    fn root_objects(&self, handle: WorkspaceHandle) -> Vec<ObjectRef> {
        self.state
            .lock()
            .workspace(handle)
            .map(|ws| ws.objects.clone())
            .unwrap_or_default()
    }

    fn is_object_active(&self, object: ObjectRef) -> bool {
        self.state
            .lock()
            .objects
            .get(&object)
            .is_some_and(|s| s.alive && s.active)
    }

    fn set_object_active(&self, object: ObjectRef, active: bool) {
        let mut state = self.state.lock();
        let Some(s) = state.objects.get_mut(&object) else {
            return;
        };
        if !s.alive || s.active == active {
            return;
        }
        s.active = active;
        let workspace = s.owner;
        state.journal.push(if active {
            HostEvent::ObjectActivated { workspace, object }
        } else {
            HostEvent::ObjectDeactivated { workspace, object }
        });
        state.note_live();
    }

    fn is_object_alive(&self, object: ObjectRef) -> bool {
        self.state
            .lock()
            .objects
            .get(&object)
            .is_some_and(|s| s.alive)
    }

    fn active_workspace(&self) -> Option<WorkspaceHandle> {
        self.state.lock().active
    }

    fn set_active_workspace(&self, handle: WorkspaceHandle) -> bool {
        let mut state = self.state.lock();
        if state.workspace(handle).is_none() {
            return false;
        }
        if state.active != Some(handle) {
            state.set_active(handle);
        }
        true
    }

    fn reclaim_unused_resources(&self) {
        let mut state = self.state.lock();
        state.reclaims += 1;
        state.journal.push(HostEvent::Reclaimed);
        tracing::trace!(total = state.reclaims, "memory host reclaimed resources");
    }

    fn resolve_by_name(&self, name: &str) -> Option<WorkspaceHandle> {
        let state = self.state.lock();
        let mut matches = state.loaded.iter().filter(|ws| ws.name == name);
        match (matches.next(), matches.next()) {
            (Some(ws), None) => Some(ws.handle),
            _ => None,
        }
    }

    fn resolve_by_path(&self, path: &str) -> Option<WorkspaceHandle> {
        self.state
            .lock()
            .loaded
            .iter()
            .rev()
            .find(|ws| ws.path == path)
            .map(|ws| ws.handle)
    }

    fn resolve_by_index(&self, index: usize) -> Option<WorkspaceHandle> {
        self.state
            .lock()
            .loaded
            .iter()
            .rev()
            .find(|ws| ws.build_index == index)
            .map(|ws| ws.handle)
    }

    fn is_valid(&self, handle: WorkspaceHandle) -> bool {
        self.state.lock().workspace(handle).is_some()
    }

    fn loaded_count(&self) -> usize {
        self.state.lock().loaded.len()
    }

    fn build_index(&self, handle: WorkspaceHandle) -> Option<usize> {
        self.state.lock().workspace(handle).map(|ws| ws.build_index)
    }

    fn name(&self, handle: WorkspaceHandle) -> Option<String> {
        self.state.lock().workspace(handle).map(|ws| ws.name.clone())
    }
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryHost")
            .field("catalog", &self.catalog.len())
            .field("loaded", &state.loaded.len())
            .field("active", &state.active)
            .field("pending_loads", &state.loads.len())
            .field("pending_unloads", &state.unloads.len())
            .finish()
    }
}
