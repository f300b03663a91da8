//! Load progress reporting
//!
//! [`ProgressAggregator::report`] spawns a polling loop that pushes a load's
//! progress to a [`ProgressSink`] once per scheduler tick and finishes with
//! exactly 1.0.

use crate::operation::AsyncOperation;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Receives progress values in `[0, 1]`
pub trait ProgressSink: Send + Sync {
    /// Receive an intermediate progress value
    fn report(&self, progress: f32);

    /// Receive the terminal value. Defaults to reporting 1.0.
    fn finish(&self) {
        self.report(1.0);
    }
}

/// Shared sink reference accepted by every async entry point
pub type SharedProgressSink = Arc<dyn ProgressSink>;

impl<F> ProgressSink for F
where
    F: Fn(f32) + Send + Sync,
{
    fn report(&self, progress: f32) {
        self(progress)
    }
}

/// Progress sink backed by a bounded channel
///
/// Intermediate values are dropped when the channel is full. The terminal 1.0
/// is never dropped: if the channel is full, the oldest queued value is
/// discarded to make room. The sink keeps a receiver of its own for that, so
/// the channel stays open after the caller's receiver is gone and late values
/// simply queue up to capacity.
pub struct ChannelSink {
    tx: Sender<f32>,
    overflow: Receiver<f32>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes it
    pub fn new(capacity: usize) -> (Self, Receiver<f32>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                tx,
                overflow: rx.clone(),
            },
            rx,
        )
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, progress: f32) {
        let _ = self.tx.try_send(progress);
    }

    fn finish(&self) {
        while let Err(TrySendError::Full(_)) = self.tx.try_send(1.0) {
            let _ = self.overflow.try_recv();
        }
    }
}

/// Sink that records every reported value
#[derive(Debug, Default)]
pub struct ProgressHistory {
    values: Mutex<Vec<f32>>,
}

impl ProgressHistory {
    /// Create an empty history
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Values reported so far
    pub fn values(&self) -> Vec<f32> {
        self.values.lock().clone()
    }

    /// Last reported value
    pub fn last(&self) -> Option<f32> {
        self.values.lock().last().copied()
    }
}

impl ProgressSink for ProgressHistory {
    fn report(&self, progress: f32) {
        self.values.lock().push(progress);
    }
}

/// Polls load progress once per scheduler tick
pub struct ProgressAggregator;

impl ProgressAggregator {
    /// Spawn a polling loop for `source`
    ///
    /// The task ends after it has observed completion and pushed 1.0.
    pub fn report(source: AsyncOperation, sink: SharedProgressSink) -> JoinHandle<()> {
        tokio::spawn(Self::poll(source, sink))
    }

    /// The polling loop itself
    pub async fn poll(source: AsyncOperation, sink: SharedProgressSink) {
        let mut last = 0.0_f32;
        while !source.is_done() {
            let progress = source.progress().max(last);
            sink.report(progress);
            last = progress;
            tokio::task::yield_now().await;
        }
        sink.finish();
    }
}
