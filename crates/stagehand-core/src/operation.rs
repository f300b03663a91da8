//! Async operation handles shared between host and orchestrator
//!
//! The host creates an [`AsyncOperation`] for every load or unload it begins,
//! keeps a clone to drive it (`set_progress`, `complete`), and hands the other
//! clone to the orchestrator, which reads progress, opens the activation gate
//! and waits for completion.

use crate::types::WorkspaceHandle;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

struct OperationState {
    progress: Mutex<f32>,
    allow_activation: AtomicBool,
    result: Mutex<Option<WorkspaceHandle>>,
    done: watch::Sender<bool>,
    callbacks: Mutex<Vec<CompletionCallback>>,
}

/// Handle to an in-flight host operation
///
/// Cloning is cheap; all clones observe the same operation.
#[derive(Clone)]
pub struct AsyncOperation {
    state: Arc<OperationState>,
}

impl AsyncOperation {
    /// Create a pending operation whose activation gate is open
    pub fn new() -> Self {
        Self::with_gate(true)
    }

    /// Create a pending operation whose activation gate is closed
    pub fn with_activation_withheld() -> Self {
        Self::with_gate(false)
    }

    /// Create an operation that has already completed
    pub fn completed() -> Self {
        let op = Self::new();
        op.complete();
        op
    }

    fn with_gate(allow_activation: bool) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            state: Arc::new(OperationState {
                progress: Mutex::new(0.0),
                allow_activation: AtomicBool::new(allow_activation),
                result: Mutex::new(None),
                done,
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Current progress in `[0, 1]`
    ///
    /// Never decreases; pinned at 1.0 once the operation is done.
    pub fn progress(&self) -> f32 {
        if self.is_done() {
            return 1.0;
        }
        *self.state.progress.lock()
    }

    /// Record host-side progress. Regressions and NaN are ignored.
    pub fn set_progress(&self, progress: f32) {
        if progress.is_nan() {
            return;
        }
        let progress = progress.clamp(0.0, 1.0);
        let mut current = self.state.progress.lock();
        if progress > *current {
            *current = progress;
        }
    }

    /// Whether the host may finalize the operation
    pub fn allow_activation(&self) -> bool {
        self.state.allow_activation.load(Ordering::Acquire)
    }

    /// Open or close the activation gate
    pub fn set_allow_activation(&self, allow: bool) {
        self.state.allow_activation.store(allow, Ordering::Release);
    }

    /// Whether the operation has completed
    pub fn is_done(&self) -> bool {
        *self.state.done.borrow()
    }

    /// Mark the operation as completed
    ///
    /// Pins progress at 1.0, wakes every waiter and runs the registered
    /// completion callbacks in registration order. Calling it again is a no-op.
    pub fn complete(&self) {
        *self.state.progress.lock() = 1.0;
        if self.state.done.send_replace(true) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.state.callbacks.lock());
        for callback in callbacks {
            callback();
        }
    }

    /// Complete a load with the workspace it produced
    ///
    /// The handle is visible through [`result`](Self::result) before any
    /// completion callback runs. Ignored if the operation is already done.
    pub fn complete_with(&self, handle: WorkspaceHandle) {
        if self.is_done() {
            return;
        }
        *self.state.result.lock() = Some(handle);
        self.complete();
    }

    /// Workspace produced by a completed load, if the host reported one
    pub fn result(&self) -> Option<WorkspaceHandle> {
        *self.state.result.lock()
    }

    /// Run `callback` when the operation completes
    ///
    /// Runs immediately on the calling thread if the operation is already done.
    pub fn on_completed<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut callbacks = self.state.callbacks.lock();
        if self.is_done() {
            drop(callbacks);
            callback();
            return;
        }
        callbacks.push(Box::new(callback));
    }

    /// Suspend until the operation completes
    pub async fn wait(&self) {
        let mut rx = self.state.done.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl Default for AsyncOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AsyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncOperation")
            .field("progress", &self.progress())
            .field("allow_activation", &self.allow_activation())
            .field("done", &self.is_done())
            .finish()
    }
}
