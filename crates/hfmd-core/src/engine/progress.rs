//! Progress sink - the narrow callback surface between tasks and the UI
//!
//! Tasks call `start`, then `set_total` once, then `advance` after every
//! chunk. Rendering is entirely up to the implementation.

use hfmd_types::{TaskId, TransferEvent, TransferOutcome};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Receives byte-count updates from transfer tasks
pub trait ProgressSink: Send + Sync {
    /// A task has left `Pending`
    fn start(&self, task: TaskId, path: &str);

    /// Expected total size, called at most once and before any `advance`
    fn set_total(&self, task: TaskId, total: u64);

    /// `delta` more bytes are on disk
    fn advance(&self, task: TaskId, delta: u64);

    /// Terminal outcome of the task
    fn finish(&self, _task: TaskId, _outcome: &TransferOutcome) {}
}

/// Sink that drops every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn start(&self, _task: TaskId, _path: &str) {}
    fn set_total(&self, _task: TaskId, _total: u64) {}
    fn advance(&self, _task: TaskId, _delta: u64) {}
}

/// Sink that publishes `TransferEvent`s on broadcast channels
///
/// Lifecycle events (start, total, finish) and byte counts travel on
/// separate channels so a flood of `TaskProgress` never pushes a lifecycle
/// event out of a lagging receiver. Byte counts are cumulative, so missing
/// some of them still leaves the right position.
pub struct EventProgress {
    event_tx: broadcast::Sender<TransferEvent>,
    progress_tx: broadcast::Sender<TransferEvent>,
    transferred: Mutex<HashMap<TaskId, u64>>,
}

impl EventProgress {
    pub fn new(
        event_tx: broadcast::Sender<TransferEvent>,
        progress_tx: broadcast::Sender<TransferEvent>,
    ) -> Self {
        Self {
            event_tx,
            progress_tx,
            transferred: Mutex::new(HashMap::new()),
        }
    }
}

impl ProgressSink for EventProgress {
    fn start(&self, task: TaskId, path: &str) {
        self.transferred.lock().insert(task, 0);
        let _ = self.event_tx.send(TransferEvent::TaskStarted {
            task,
            path: path.to_string(),
        });
    }

    fn set_total(&self, task: TaskId, total: u64) {
        let _ = self.event_tx.send(TransferEvent::TaskTotal { task, total });
    }

    fn advance(&self, task: TaskId, delta: u64) {
        let transferred = {
            let mut counters = self.transferred.lock();
            let counter = counters.entry(task).or_insert(0);
            *counter += delta;
            *counter
        };
        let _ = self
            .progress_tx
            .send(TransferEvent::TaskProgress { task, transferred });
    }

    fn finish(&self, task: TaskId, outcome: &TransferOutcome) {
        self.transferred.lock().remove(&task);
        let _ = self.event_tx.send(TransferEvent::TaskFinished {
            task,
            outcome: outcome.clone(),
        });
    }
}
