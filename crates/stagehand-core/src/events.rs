//! Transition events with bounded channels
//!
//! Every phase change of a transition is published as a [`TransitionEvent`].
//! Publishing never blocks: when the bus is full the event is dropped and
//! only the `tracing` record remains.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifies one transition instance within an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransitionId(pub u64);

impl std::fmt::Display for TransitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Lifecycle phase of a transition
///
/// `Created → Loading → (DeactivatingOld) → ActivatingNew → UnloadingOld →
/// Reclaiming → Done`. An add stops at `ActivatingNew`; a revertable switch
/// stops there too until its token reverts (`Reverted`) or commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPhase {
    Created,
    Loading,
    DeactivatingOld,
    ActivatingNew,
    UnloadingOld,
    Reclaiming,
    Done,
    Reverted,
}

impl TransitionPhase {
    /// Short name for display
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionPhase::Created => "created",
            TransitionPhase::Loading => "loading",
            TransitionPhase::DeactivatingOld => "deactivating-old",
            TransitionPhase::ActivatingNew => "activating-new",
            TransitionPhase::UnloadingOld => "unloading-old",
            TransitionPhase::Reclaiming => "reclaiming",
            TransitionPhase::Done => "done",
            TransitionPhase::Reverted => "reverted",
        }
    }
}

impl std::fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition entered a new phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Which transition
    pub transition: TransitionId,

    /// Identifier the transition loads
    pub target: String,

    /// Phase just entered
    pub phase: TransitionPhase,
}

/// Event bus using a bounded crossbeam channel
pub struct EventBus {
    tx: Sender<TransitionEvent>,
    rx: Receiver<TransitionEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Get a sender clone to hand to an engine
    pub fn sender(&self) -> Sender<TransitionEvent> {
        self.tx.clone()
    }

    /// Receive next event, blocking until available or timeout
    pub fn recv_timeout(&self, timeout: Duration) -> Option<TransitionEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Try to receive without blocking
    pub fn try_recv(&self) -> Option<TransitionEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drain up to max events from the queue
    pub fn drain(&self, max: usize) -> Vec<TransitionEvent> {
        let mut events = Vec::with_capacity(max.min(64));
        while events.len() < max {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        events
    }
}

/// Tracks and publishes the phase of one transition
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    id: TransitionId,
    label: String,
    phase: TransitionPhase,
    events: Option<Sender<TransitionEvent>>,
}

impl PhaseTracker {
    /// Start tracking in `Created`
    pub(crate) fn new(id: TransitionId, label: impl Into<String>, events: Option<Sender<TransitionEvent>>) -> Self {
        let tracker = Self {
            id,
            label: label.into(),
            phase: TransitionPhase::Created,
            events,
        };
        tracker.publish();
        tracker
    }

    pub(crate) fn id(&self) -> TransitionId {
        self.id
    }

    pub(crate) fn phase(&self) -> TransitionPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, phase: TransitionPhase) {
        self.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        tracing::debug!(transition = %self.id, workspace = %self.label, phase = %self.phase, "transition phase");
        if let Some(tx) = &self.events {
            let _ = tx.try_send(TransitionEvent {
                transition: self.id,
                target: self.label.clone(),
                phase: self.phase,
            });
        }
    }
}
