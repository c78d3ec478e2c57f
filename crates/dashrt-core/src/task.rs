use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::params::TaskParams;

/// Process-unique task identifier. Allocation is the caller's business; the
/// façade hands them out from a monotonic counter.
pub type TaskId = u64;

/// Which family of execution resource a task wants.
///
/// `Cpu` is satisfied by any CPU worker; the remaining kinds name overlay
/// families and steer the task towards a matching FPGA slot when one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cpu,
    Zip,
    Fft,
    Fir,
}

impl Default for ResourceKind {
    fn default() -> Self {
        Self::Cpu
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Cpu => "cpu",
            Self::Zip => "zip",
            Self::Fft => "fft",
            Self::Fir => "fir",
        };
        f.write_str(s)
    }
}

/// A unit of submitted work.
///
/// Immutable after submission; the scheduler's queues share it behind an
/// `Arc`. `release_time` only participates in ordering ties; tasks released
/// in the future are still eligible immediately.
#[derive(Debug)]
pub struct Task {
    pub id: TaskId,
    /// Logical operation name (e.g. "fft", "zip"); resolved against the
    /// [`AppRegistry`](crate::AppRegistry) at dispatch time.
    pub app: String,
    /// Larger = earlier.
    pub priority: i32,
    pub release_time: Instant,
    /// Informational; the scheduler does not enforce deadlines.
    pub deadline: Option<Instant>,
    /// Ids that must have completed successfully before this task is ready.
    pub depends_on: Vec<TaskId>,
    pub required: ResourceKind,
    pub params: TaskParams,
    /// Runtime hint; the mock execution path sleeps for this long.
    pub est_runtime: Duration,
}

impl Task {
    pub fn new(id: TaskId, app: impl Into<String>) -> Self {
        Self {
            id,
            app: app.into(),
            priority: 0,
            release_time: Instant::now(),
            deadline: None,
            depends_on: Vec::new(),
            required: ResourceKind::Cpu,
            params: TaskParams::default(),
            est_runtime: Duration::ZERO,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_depends_on(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.depends_on = deps.into_iter().collect();
        self
    }

    pub fn with_required(mut self, required: ResourceKind) -> Self {
        self.required = required;
        self
    }

    pub fn with_params(mut self, params: TaskParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_est_runtime(mut self, est: Duration) -> Self {
        self.est_runtime = est;
        self
    }
}

/// Outcome of running one task on one accelerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub id: TaskId,
    pub ok: bool,
    pub message: String,
    pub runtime: Duration,
    /// Name of the accelerator that ran (or refused) the task.
    pub worker: String,
}

impl ExecutionResult {
    /// A result for a task that never reached an accelerator.
    pub fn rejected(id: TaskId, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            message: message.into(),
            runtime: Duration::ZERO,
            worker: String::new(),
        }
    }
}
