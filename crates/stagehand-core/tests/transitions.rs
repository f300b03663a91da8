//! End-to-end transition behavior against the in-memory host

use pretty_assertions::assert_eq;
use stagehand_core::{
    EventBus, HostEvent, MemoryHost, ObjectDefinition, PreloadRegistry, ProgressHistory, SharedHost, StagehandError,
    TransitionConfig, TransitionEngine, TransitionPhase, WorkspaceDefinition, WorkspaceHandle, WorkspaceHost,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Harness {
    host: Arc<MemoryHost>,
    engine: TransitionEngine,
    bus: EventBus,
    pump: JoinHandle<()>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn catalog() -> Vec<WorkspaceDefinition> {
    vec![
        WorkspaceDefinition::new("Title", &["Camera", "Menu"]),
        WorkspaceDefinition::with_objects(
            "Level1",
            vec![
                ObjectDefinition::active("Camera"),
                ObjectDefinition::active("Player"),
                ObjectDefinition::inactive("PauseMenu"),
            ],
        )
        .with_load_steps(6),
        WorkspaceDefinition::new("Level2", &["Camera", "Player"]),
        WorkspaceDefinition::new("Menu", &["Overlay"]).with_load_steps(2),
        WorkspaceDefinition::new("X", &["Root"]),
        WorkspaceDefinition::new("Y", &["Root"]),
        WorkspaceDefinition::new("Z", &["Root"]),
    ]
}

fn harness(config: TransitionConfig) -> Harness {
    let host = Arc::new(MemoryHost::new(catalog()));
    let shared: SharedHost = host.clone();
    let registry = Arc::new(PreloadRegistry::new(Arc::clone(&shared)));
    let bus = EventBus::new(256);
    let engine = TransitionEngine::new(shared, registry, config).with_events(bus.sender());
    let pump = host.spawn_pump();
    Harness { host, engine, bus, pump }
}

/// Give the pump enough ticks to finish outstanding unloads
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

async fn add(h: &Harness, id: &str) -> WorkspaceHandle {
    h.engine.add(id, true).execute().await.unwrap().handle()
}

/// Index of the first journal entry matching `wanted`
fn position(journal: &[HostEvent], wanted: impl Fn(&HostEvent) -> bool) -> usize {
    journal.iter().position(wanted).unwrap()
}

/// Handles of every workspace named `name` that was ever loaded
fn loaded_handles(journal: &[HostEvent], name: &str) -> Vec<WorkspaceHandle> {
    journal
        .iter()
        .filter_map(|e| match e {
            HostEvent::Loaded { workspace, name: loaded } if loaded == name => Some(*workspace),
            _ => None,
        })
        .collect()
}

fn phases_of(h: &Harness) -> Vec<Vec<TransitionPhase>> {
    let mut grouped: Vec<(u64, Vec<TransitionPhase>)> = Vec::new();
    for event in h.bus.drain(usize::MAX) {
        match grouped.iter_mut().find(|(id, _)| *id == event.transition.0) {
            Some((_, phases)) => phases.push(event.phase),
            None => grouped.push((event.transition.0, vec![event.phase])),
        }
    }
    grouped.into_iter().map(|(_, phases)| phases).collect()
}

#[tokio::test]
async fn test_switch_never_has_two_live_workspaces() {
    let h = harness(TransitionConfig::default());
    let title = add(&h, "Title").await;
    h.host.clear_journal();
    h.host.reset_peak();

    let level = h.engine.switch("Level1", title).execute().await.unwrap().handle();

    assert_eq!(h.host.peak_live_workspaces(), 1);
    assert_eq!(h.host.active_workspace(), Some(level));

    let journal = h.host.journal();
    let last_deactivated = journal
        .iter()
        .rposition(|e| matches!(e, HostEvent::ObjectDeactivated { workspace, .. } if *workspace == title))
        .unwrap();
    let loaded = journal
        .iter()
        .position(|e| matches!(e, HostEvent::Loaded { workspace, .. } if *workspace == level))
        .unwrap();
    let pointed = journal
        .iter()
        .position(|e| matches!(e, HostEvent::ActiveWorkspaceChanged { workspace } if *workspace == level))
        .unwrap();
    assert!(last_deactivated < loaded);
    assert!(loaded < pointed);
}

#[tokio::test]
async fn test_revertable_switch_never_has_two_live_workspaces() {
    let h = harness(TransitionConfig::default());
    let level = add(&h, "Level1").await;
    h.host.reset_peak();

    let token = h
        .engine
        .switch_with_revertable("Menu", level)
        .execute()
        .await
        .unwrap()
        .into_revert_token()
        .unwrap();
    assert_eq!(h.host.peak_live_workspaces(), 1);

    token.revert(true).await.unwrap();
    assert_eq!(h.host.peak_live_workspaces(), 1);
}

#[tokio::test]
async fn test_preload_dedup_and_pop_once() {
    let h = harness(TransitionConfig::default());
    let registry = h.engine.registry();

    assert!(registry.create("X"));
    assert!(!registry.create("X"));
    assert_eq!(registry.len(), 1);
    assert_eq!(h.host.pending_operations(), 1);

    assert!(registry.pop("X").is_some());
    assert!(registry.pop("X").is_none());
}

#[tokio::test]
async fn test_snapshot_restored_on_revert() {
    let h = harness(TransitionConfig::default());
    let level = add(&h, "Level1").await;
    let camera = h.host.find_object(level, "Camera").unwrap();
    let player = h.host.find_object(level, "Player").unwrap();
    let pause = h.host.find_object(level, "PauseMenu").unwrap();

    let token = h
        .engine
        .switch_with_revertable("Title", level)
        .execute()
        .await
        .unwrap()
        .into_revert_token()
        .unwrap();

    let title = token.to_unload();
    assert_eq!(token.to_activate(), level);
    assert_eq!(token.snapshot().objects(), &[camera, player]);
    assert_eq!(h.host.active_workspace(), Some(title));
    assert!(h.host.is_valid(level));
    assert!(h.host.root_objects(level).iter().all(|o| !h.host.is_object_active(*o)));

    token.revert(true).await.unwrap();

    assert_eq!(h.host.active_workspace(), Some(level));
    assert!(h.host.is_object_active(camera));
    assert!(h.host.is_object_active(player));
    assert!(!h.host.is_object_active(pause));
    assert!(!h.host.is_valid(title));
    assert_eq!(h.host.reclaim_count(), 1);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_one() {
    let h = harness(TransitionConfig::default());
    let title = add(&h, "Title").await;
    let history = ProgressHistory::new();

    h.engine
        .switch("Level1", title)
        .with_progress(history.clone())
        .execute()
        .await
        .unwrap();
    settle().await;

    let values = history.values();
    assert!(values.len() > 1);
    assert!(values.windows(2).all(|w| w[0] <= w[1]));
    assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(history.last(), Some(1.0));
}

#[tokio::test]
async fn test_load_flushes_older_preloads() {
    let h = harness(TransitionConfig::default());
    let registry = h.engine.registry();
    registry.create("X");
    registry.create("Y");

    let y = registry.load("Y", None).await.unwrap();
    settle().await;

    assert_eq!(h.host.active_workspace(), Some(y));
    assert_eq!(h.host.loaded_names(), vec!["Y"]);
    assert!(registry.is_empty());
    assert_eq!(h.host.reclaim_count(), 1);
}

#[tokio::test]
async fn test_load_of_unregistered_id_flushes_in_order() {
    let h = harness(TransitionConfig::default());
    let registry = h.engine.registry();
    registry.create("X");
    registry.create("Y");

    let z = registry.load("Z", None).await.unwrap();
    settle().await;

    assert_eq!(h.host.active_workspace(), Some(z));
    assert_eq!(h.host.loaded_names(), vec!["Z"]);
    assert_eq!(h.host.reclaim_count(), 1);

    let journal = h.host.journal();
    let x = loaded_handles(&journal, "X")[0];
    let y = loaded_handles(&journal, "Y")[0];
    for stale in [x, y] {
        let loaded = position(&journal, |e| matches!(e, HostEvent::Loaded { workspace, .. } if *workspace == stale));
        let deactivated = position(&journal, |e| {
            matches!(e, HostEvent::ObjectDeactivated { workspace, .. } if *workspace == stale)
        });
        let unloaded = position(&journal, |e| matches!(e, HostEvent::Unloaded { workspace } if *workspace == stale));
        assert!(loaded < deactivated);
        assert!(deactivated < unloaded);
    }

    let loaded_x = position(&journal, |e| matches!(e, HostEvent::Loaded { workspace, .. } if *workspace == x));
    let loaded_y = position(&journal, |e| matches!(e, HostEvent::Loaded { workspace, .. } if *workspace == y));
    let unloaded_x = position(&journal, |e| matches!(e, HostEvent::Unloaded { workspace } if *workspace == x));
    let unloaded_y = position(&journal, |e| matches!(e, HostEvent::Unloaded { workspace } if *workspace == y));
    let reclaimed = position(&journal, |e| matches!(e, HostEvent::Reclaimed));
    assert!(loaded_x < loaded_y);
    assert!(unloaded_x < unloaded_y);
    assert!(unloaded_x < reclaimed && unloaded_y < reclaimed);
}

#[tokio::test]
async fn test_flush_keeps_already_loaded_copy() {
    let h = harness(TransitionConfig::default());
    let level1 = add(&h, "Level1").await;
    let registry = h.engine.registry();
    registry.create("Level1");
    registry.create("Level2");

    let level2 = registry.load("Level2", None).await.unwrap();
    settle().await;

    assert_eq!(h.host.loaded(), vec![level1, level2]);
    assert_eq!(h.host.loaded_names(), vec!["Level1", "Level2"]);
    assert_eq!(h.host.active_workspace(), Some(level2));
    assert_eq!(h.host.reclaim_count(), 1);
    assert!(h.host.is_object_active(h.host.find_object(level1, "Player").unwrap()));

    let journal = h.host.journal();
    let copies = loaded_handles(&journal, "Level1");
    assert_eq!(copies.len(), 2);
    let copy = copies[1];
    let loaded = position(&journal, |e| matches!(e, HostEvent::Loaded { workspace, .. } if *workspace == copy));
    let unloaded = position(&journal, |e| matches!(e, HostEvent::Unloaded { workspace } if *workspace == copy));
    assert!(loaded < unloaded);
    assert!(!journal
        .iter()
        .any(|e| matches!(e, HostEvent::Unloaded { workspace } if *workspace == level1)));
}

#[tokio::test]
async fn test_add_leaves_unrelated_preloads_pending() {
    let h = harness(TransitionConfig::default());
    let registry = h.engine.registry();
    registry.create("Level2");

    let title = add(&h, "Title").await;
    assert_eq!(registry.pending_ids(), vec!["Level2"]);

    let level2 = h.engine.switch("Level2", title).execute().await.unwrap().handle();
    settle().await;

    assert!(registry.is_empty());
    assert_eq!(h.host.loaded(), vec![level2]);
    assert_eq!(h.host.reclaim_count(), 1);
    let requests = h
        .host
        .journal()
        .iter()
        .filter(|e| matches!(e, HostEvent::LoadRequested { target, .. } if target.identifier() == "Level2"))
        .count();
    assert_eq!(requests, 1);
}

#[tokio::test]
async fn test_dropped_preload_does_not_stall_later_loads() {
    let h = harness(TransitionConfig::default());
    let registry = h.engine.registry();
    registry.create("Level1");
    drop(registry.pop("Level1"));

    let level2 = tokio::time::timeout(Duration::from_secs(5), h.engine.add("Level2", true).execute())
        .await
        .expect("add stalled behind a dropped preload")
        .unwrap()
        .handle();
    settle().await;

    assert_eq!(h.host.loaded(), vec![level2]);
    assert_eq!(h.host.active_workspace(), Some(level2));
    assert_eq!(h.host.pending_operations(), 0);
}

#[tokio::test]
async fn test_unexecuted_transition_loads_nothing() {
    let h = harness(TransitionConfig::default());
    drop(h.engine.add("Level2", true));

    h.engine.registry().create("X");
    drop(h.engine.add("X", true));
    settle().await;

    assert!(h.engine.registry().is_empty());
    assert_eq!(h.host.loaded_count(), 0);
    assert_eq!(h.host.pending_operations(), 0);
}

#[tokio::test]
async fn test_switch_through_preload_keeps_newer_entries() {
    let h = harness(TransitionConfig::default());
    let title = add(&h, "Title").await;
    let registry = h.engine.registry();
    registry.create("X");
    registry.create("Level2");
    registry.create("Z");

    let level = h.engine.switch("Level2", title).execute().await.unwrap().handle();
    settle().await;

    assert_eq!(h.host.active_workspace(), Some(level));
    assert_eq!(registry.pending_ids(), vec!["Z"]);
    assert_eq!(h.host.loaded_names(), vec!["Level2"]);
}

#[tokio::test]
async fn test_switch_waiting_for_unload() {
    let h = harness(TransitionConfig::default());
    let level1 = add(&h, "Level1").await;

    let level2 = h.engine.switch("Level2", level1).execute().await.unwrap().handle();

    assert_eq!(h.host.active_workspace(), Some(level2));
    assert!(!h.host.is_valid(level1));
    assert_eq!(h.host.reclaim_count(), 1);
}

#[tokio::test]
async fn test_switch_without_waiting_reclaims_on_unload() {
    let h = harness(TransitionConfig::default());
    let level1 = add(&h, "Level1").await;

    let level2 = h
        .engine
        .switch("Level2", level1)
        .wait_unload(false)
        .execute()
        .await
        .unwrap()
        .handle();

    assert_eq!(h.host.active_workspace(), Some(level2));
    assert!(h.host.is_valid(level1));
    assert_eq!(h.host.reclaim_count(), 0);

    settle().await;
    assert!(!h.host.is_valid(level1));
    assert_eq!(h.host.reclaim_count(), 1);
}

#[tokio::test]
async fn test_immediate_revert_restores_original_state() {
    let h = harness(TransitionConfig::default());
    let game = add(&h, "Level1").await;
    let before: Vec<bool> = h
        .host
        .root_objects(game)
        .iter()
        .map(|o| h.host.is_object_active(*o))
        .collect();

    let token = h
        .engine
        .switch_with_revertable("Menu", game)
        .execute()
        .await
        .unwrap()
        .into_revert_token()
        .unwrap();
    let menu = token.to_unload();
    token.revert(false).await.unwrap();
    settle().await;

    let after: Vec<bool> = h
        .host
        .root_objects(game)
        .iter()
        .map(|o| h.host.is_object_active(*o))
        .collect();
    assert_eq!(after, before);
    assert_eq!(h.host.active_workspace(), Some(game));
    assert!(!h.host.is_valid(menu));
    assert_eq!(h.host.loaded_names(), vec!["Level1"]);
    assert_eq!(h.host.reclaim_count(), 1);
}

#[tokio::test]
async fn test_revert_unloading_other_workspace() {
    let h = harness(TransitionConfig::default());
    let game = add(&h, "Level1").await;
    let token = h
        .engine
        .switch_with_revertable("Menu", game)
        .execute()
        .await
        .unwrap()
        .into_revert_token()
        .unwrap();
    let menu = token.to_unload();
    let extra = h.engine.add("Level2", false).execute().await.unwrap().handle();

    token.revert_unloading(extra, true).await.unwrap();

    assert_eq!(h.host.active_workspace(), Some(game));
    assert!(!h.host.is_valid(extra));
    assert!(h.host.is_valid(menu));
}

#[tokio::test]
async fn test_revert_to_unloaded_workspace_fails() {
    let h = harness(TransitionConfig::default());
    let game = add(&h, "Level1").await;
    let token = h
        .engine
        .switch_with_revertable("Menu", game)
        .execute()
        .await
        .unwrap()
        .into_revert_token()
        .unwrap();

    h.host.begin_unload(game).wait().await;

    let err = token.revert(true).await.unwrap_err();
    assert!(matches!(err, StagehandError::InvalidRevertTarget(handle) if handle == game));
}

#[tokio::test]
async fn test_commit_unloads_previous_workspace() {
    let h = harness(TransitionConfig::default());
    let game = add(&h, "Level1").await;
    let token = h
        .engine
        .switch_with_revertable("Title", game)
        .execute()
        .await
        .unwrap()
        .into_revert_token()
        .unwrap();
    let title = token.to_unload();

    token.commit(true).await;

    assert_eq!(h.host.active_workspace(), Some(title));
    assert!(!h.host.is_valid(game));
    assert_eq!(h.host.reclaim_count(), 1);
}

#[tokio::test]
async fn test_add_leaves_other_workspaces_alone() {
    let h = harness(TransitionConfig::default());
    let title = add(&h, "Title").await;

    let level = h.engine.add("Level2", false).execute().await.unwrap().handle();

    assert_eq!(h.host.active_workspace(), Some(title));
    assert!(h.host.is_valid(level));
    assert!(h.host.root_objects(title).iter().all(|o| h.host.is_object_active(*o)));
    assert_eq!(h.host.reclaim_count(), 0);
}

#[tokio::test]
async fn test_add_unknown_workspace_fails_resolution() {
    let h = harness(TransitionConfig::default());
    let err = h.engine.add("Nowhere", true).execute().await.unwrap_err();
    assert!(matches!(err, StagehandError::SceneResolutionFailed(ref id) if id == "Nowhere"));
}

#[tokio::test]
async fn test_reload_in_place_keeps_a_workspace_loaded() {
    let h = harness(TransitionConfig::default());
    let level = add(&h, "Level1").await;

    let sampler_host = Arc::clone(&h.host);
    let sampler = tokio::spawn(async move {
        let mut fewest = usize::MAX;
        for _ in 0..64 {
            fewest = fewest.min(sampler_host.loaded_count());
            tokio::task::yield_now().await;
        }
        fewest
    });

    let reloaded = h.engine.reload(level, None).await.unwrap();
    assert_eq!(sampler.await.unwrap(), 1);

    assert_ne!(reloaded, level);
    assert!(!h.host.is_valid(level));
    assert_eq!(h.host.name(reloaded).as_deref(), Some("Level1"));
    assert_eq!(h.host.active_workspace(), Some(reloaded));
    assert_eq!(h.host.loaded_count(), 1);
    assert_eq!(h.host.reclaim_count(), 1);
}

#[tokio::test]
async fn test_reload_with_other_workspaces_unloads_first() {
    let h = harness(TransitionConfig::default());
    let title = add(&h, "Title").await;
    let level = add(&h, "Level2").await;

    let reloaded = h.engine.reload(level, None).await.unwrap();

    assert!(h.host.is_valid(title));
    assert!(!h.host.is_valid(level));
    assert_eq!(h.host.name(reloaded).as_deref(), Some("Level2"));
    assert_eq!(h.host.active_workspace(), Some(reloaded));
    assert_eq!(h.host.loaded_names(), vec!["Title", "Level2"]);
}

#[tokio::test]
async fn test_reload_of_unloaded_workspace_fails() {
    let h = harness(TransitionConfig::default());
    let err = h.engine.reload(WorkspaceHandle::new(99), None).await.unwrap_err();
    assert!(matches!(err, StagehandError::SceneResolutionFailed(_)));
}

#[tokio::test]
async fn test_phase_events_follow_state_machine() {
    let h = harness(TransitionConfig::default());
    let title = add(&h, "Title").await;
    h.engine.switch("Level1", title).execute().await.unwrap();

    use TransitionPhase::*;
    assert_eq!(
        phases_of(&h),
        vec![
            vec![Created, Loading, ActivatingNew],
            vec![Created, Loading, DeactivatingOld, ActivatingNew, UnloadingOld, Reclaiming, Done],
        ]
    );
}

#[tokio::test]
async fn test_revert_events() {
    let h = harness(TransitionConfig::default());
    let game = add(&h, "Level1").await;
    let token = h
        .engine
        .switch_with_revertable("Menu", game)
        .execute()
        .await
        .unwrap()
        .into_revert_token()
        .unwrap();
    assert_eq!(token.phase(), TransitionPhase::ActivatingNew);
    token.revert(true).await.unwrap();

    use TransitionPhase::*;
    let phases = phases_of(&h);
    assert_eq!(
        phases[1],
        vec![Created, Loading, DeactivatingOld, ActivatingNew, Reverted, Reclaiming, Done]
    );
}
