//! Stagehand Core - workspace transition orchestration
//!
//! This crate sequences transitions between workspaces (units of loaded
//! content) on a host whose loads and unloads are asynchronous:
//! - Gated loads that stay invisible until finalized
//! - A preload cache with at most one pending load per identifier
//! - Add / Switch / SwitchWithRevertable / Reload transitions
//! - Progress reporting and transition phase events
//! - An in-memory host for tests and the CLI driver
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  prepare/execute  ┌──────────────────┐  begin_load   ┌───────────────┐
//! │     Caller       │ ─────────────────→│ TransitionEngine │ ─────────────→│ WorkspaceHost │
//! │                  │ ←─────────────────│  PreloadRegistry │ ←─────────────│ (MemoryHost)  │
//! └──────────────────┘  TransitionEvent  └──────────────────┘ AsyncOperation└───────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use stagehand_core::{MemoryHost, PreloadRegistry, TransitionConfig, TransitionEngine};
//!
//! let host = Arc::new(MemoryHost::new(config.catalog.clone()));
//! let pump = host.spawn_pump();
//!
//! let registry = Arc::new(PreloadRegistry::new(host.clone()));
//! let engine = TransitionEngine::new(host.clone(), registry, config.transitions.clone());
//!
//! engine.registry().create("Level2");
//! let level1 = engine.add("Level1", true).execute().await?.handle();
//! engine.switch("Level2", level1).execute().await?;
//! ```

pub mod config;
pub mod deferred;
pub mod error;
pub mod events;
pub mod host;
pub mod memory;
pub mod operation;
pub mod preload;
pub mod progress;
pub mod snapshot;
pub mod transition;
pub mod types;

pub use config::{StagehandConfig, TransitionConfig};
pub use deferred::DeferredLoad;
pub use error::{Result, StagehandError};
pub use events::{EventBus, TransitionEvent, TransitionId, TransitionPhase};
pub use host::{resolve_loaded_workspace, SharedHost, WorkspaceHost};
pub use memory::{HostEvent, MemoryHost, ObjectDefinition, WorkspaceDefinition};
pub use operation::AsyncOperation;
pub use preload::PreloadRegistry;
pub use progress::{ChannelSink, ProgressAggregator, ProgressHistory, ProgressSink, SharedProgressSink};
pub use snapshot::ActiveObjectSnapshot;
pub use transition::{RevertToken, Transition, TransitionEngine, TransitionFlags, TransitionOutcome};
pub use types::{LoadMode, LoadTarget, ObjectRef, WorkspaceHandle};

/// Get the crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
