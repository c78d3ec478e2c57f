use serde::{Deserialize, Serialize};

/// How the scheduler picks between CPU workers and FPGA slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// Prefer FPGA when at least one reconfigurable accelerator is
    /// available at `start()`, otherwise run everything on CPU workers.
    Auto,
    /// Force the CPU path even when slots are registered.
    Cpu,
    /// Prefer FPGA slots for non-CPU tasks.
    Fpga,
}

impl Default for BackendMode {
    fn default() -> Self {
        Self::Auto
    }
}

/// Scheduler construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub backend_mode: BackendMode,
    /// Worker task count; 0 means "use the host's available parallelism".
    pub cpu_workers: usize,
    /// Ready-count level that triggers opportunistic overlay loading;
    /// 0 disables preloading entirely.
    pub preload_threshold: u32,
    /// Emit result lines as CSV instead of the plain format.
    pub csv_report: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backend_mode: BackendMode::Auto,
            cpu_workers: 0,
            preload_threshold: 2,
            csv_report: false,
        }
    }
}

impl SchedulerConfig {
    /// Worker count after normalization: 0 resolves to the host's available
    /// parallelism (or 4 when that is unknown), and the result is never
    /// below 1.
    pub fn effective_cpu_workers(&self) -> usize {
        let n = if self.cpu_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.cpu_workers
        };
        n.max(1)
    }
}
