use std::collections::HashSet;
use std::sync::Mutex;

use dashrt_core::{Task, TaskId};

/// Records which tasks have completed successfully and answers readiness
/// queries. A failed task is never marked complete, so its dependents stay
/// parked until shutdown.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    completed: Mutex<HashSet<TaskId>>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn mark_complete(&self, id: TaskId) {
        self.completed
            .lock()
            .expect("dependency tracker lock poisoned")
            .insert(id);
    }

    pub fn is_complete(&self, id: TaskId) -> bool {
        self.completed
            .lock()
            .expect("dependency tracker lock poisoned")
            .contains(&id)
    }

    pub fn deps_satisfied(&self, task: &Task) -> bool {
        let completed = self
            .completed
            .lock()
            .expect("dependency tracker lock poisoned");
        task.depends_on.iter().all(|d| completed.contains(d))
    }
}
