use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};

use dashrt_core::Task;
use tokio::sync::Notify;

/// Heap entry ordering: higher priority first, then earlier release time,
/// then lower id (FIFO-ish for same-priority submissions).
struct QueueEntry(Arc<Task>);

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.release_time.cmp(&self.0.release_time))
            .then_with(|| other.0.id.cmp(&self.0.id))
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<QueueEntry>,
    stopped: bool,
}

/// Priority queue of ready tasks with suspending consumers and cooperative
/// shutdown. Multiple consumers are supported; each pop hands out a distinct
/// task. Once stopped, `pop` returns `None` and remaining entries are
/// abandoned.
#[derive(Default)]
pub struct ReadyQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: Arc<Task>) {
        {
            let mut inner = self.inner.lock().expect("ready queue lock poisoned");
            inner.heap.push(QueueEntry(task));
        }
        self.notify.notify_one();
    }

    /// Take the highest-priority ready task, suspending while the queue is
    /// empty. Returns `None` once the queue has been stopped.
    pub async fn pop(&self) -> Option<Arc<Task>> {
        loop {
            // Register for wakeup before checking, so a push between the
            // check and the await cannot be lost.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().expect("ready queue lock poisoned");
                if inner.stopped {
                    // Chain the wakeup so consumers that registered after
                    // the stop notification also see the flag.
                    self.notify.notify_one();
                    return None;
                }
                if let Some(QueueEntry(task)) = inner.heap.pop() {
                    if !inner.heap.is_empty() {
                        // Notify stores at most one permit; chain the wakeup
                        // so another consumer picks up the remaining work.
                        self.notify.notify_one();
                    }
                    return Some(task);
                }
            }
            notified.await;
        }
    }

    pub fn stop(&self) {
        {
            let mut inner = self.inner.lock().expect("ready queue lock poisoned");
            inner.stopped = true;
        }
        self.notify.notify_waiters();
        // Waiters that registered after notify_waiters see the stop flag;
        // one stored permit covers a consumer arriving in between.
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("ready queue lock poisoned").heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn task(id: u64, priority: i32) -> Arc<Task> {
        Arc::new(Task::new(id, "app").with_priority(priority))
    }

    #[tokio::test]
    async fn pops_highest_priority_first() {
        let q = ReadyQueue::new();
        q.push(task(1, 1));
        q.push(task(2, 5));
        q.push(task(3, 3));

        assert_eq!(q.pop().await.unwrap().id, 2);
        assert_eq!(q.pop().await.unwrap().id, 3);
        assert_eq!(q.pop().await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn equal_priority_breaks_on_release_then_id() {
        let q = ReadyQueue::new();
        let now = Instant::now();
        let mut early = Task::new(9, "app").with_priority(5);
        early.release_time = now;
        let mut late = Task::new(1, "app").with_priority(5);
        late.release_time = now + Duration::from_millis(10);
        let mut same_release = Task::new(4, "app").with_priority(5);
        same_release.release_time = now;

        q.push(Arc::new(late));
        q.push(Arc::new(same_release));
        q.push(Arc::new(early));

        // Same release time: lower id first. Later release: last.
        assert_eq!(q.pop().await.unwrap().id, 4);
        assert_eq!(q.pop().await.unwrap().id, 9);
        assert_eq!(q.pop().await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn pop_suspends_until_push() {
        let q = Arc::new(ReadyQueue::new());
        let popper = {
            let q = q.clone();
            tokio::spawn(async move { q.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!popper.is_finished());
        q.push(task(7, 0));
        assert_eq!(popper.await.unwrap().unwrap().id, 7);
    }

    #[tokio::test]
    async fn stop_wakes_all_consumers() {
        let q = Arc::new(ReadyQueue::new());
        let mut poppers = Vec::new();
        for _ in 0..3 {
            let q = q.clone();
            poppers.push(tokio::spawn(async move { q.pop().await }));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.stop();
        for p in poppers {
            assert!(p.await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn pop_after_stop_returns_none() {
        let q = ReadyQueue::new();
        q.push(task(1, 0));
        q.stop();
        assert!(q.pop().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_consumers_get_distinct_tasks() {
        let q = Arc::new(ReadyQueue::new());
        for id in 0..32 {
            q.push(task(id, 0));
        }
        let mut handles = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..8 {
                    seen.push(q.pop().await.unwrap().id);
                }
                seen
            }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..32).collect::<Vec<_>>());
        assert!(q.is_empty());
    }
}
