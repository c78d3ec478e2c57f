use std::collections::HashMap;
use std::sync::Mutex;

use dashrt_core::TaskId;
use tokio::sync::oneshot;

/// One-shot completion signals, keyed by task id.
///
/// Callers subscribe *before* submitting so the signal can never be missed;
/// the scheduler fulfills exactly once when the task's run is reported.
/// Fulfilment without a subscriber is discarded.
#[derive(Debug, Default)]
pub struct CompletionBus {
    pending: Mutex<HashMap<TaskId, oneshot::Sender<bool>>>,
}

impl CompletionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `task_id`. A second subscription for the same id
    /// replaces the first; the abandoned receiver resolves with an error.
    pub fn subscribe(&self, task_id: TaskId) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().expect("completion bus lock poisoned");
        if pending.insert(task_id, tx).is_some() {
            tracing::warn!(task_id, "replacing existing completion subscription");
        }
        rx
    }

    /// Deliver the outcome for `task_id` and drop the entry. A missing entry
    /// is a no-op, as is a receiver that has already gone away.
    pub fn fulfill(&self, task_id: TaskId, ok: bool) {
        let sender = {
            let mut pending = self.pending.lock().expect("completion bus lock poisoned");
            pending.remove(&task_id)
        };
        match sender {
            Some(tx) => {
                if tx.send(ok).is_err() {
                    tracing::debug!(task_id, "completion receiver dropped before fulfilment");
                }
            }
            None => tracing::trace!(task_id, "no completion subscriber"),
        }
    }

    /// Number of subscriptions not yet fulfilled.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("completion bus lock poisoned").len()
    }
}
