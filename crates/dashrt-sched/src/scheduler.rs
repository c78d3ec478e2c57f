use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashrt_core::{
    AppDescriptor, AppRegistry, BackendMode, ExecutionResult, ResourceKind, SchedulerConfig, Task,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::accelerator::Accelerator;
use crate::completion::CompletionBus;
use crate::deps::DependencyTracker;
use crate::ready_queue::ReadyQueue;
use crate::report::{ReportFormat, ReportSink};

/// How often the dependency watcher rescans the waiting pool.
const WATCHER_TICK: Duration = Duration::from_millis(1);

/// Owns the worker pool, the accelerator pool, and every queue between
/// submission and completion.
///
/// Construct, register accelerators, `start()`, submit tasks (submission is
/// also valid before `start()`), and `stop()` when done. All entry points
/// must be called from within a tokio runtime.
pub struct Scheduler {
    registry: Arc<AppRegistry>,
    config: SchedulerConfig,
    ready: ReadyQueue,
    deps: DependencyTracker,
    completion: Arc<CompletionBus>,
    report: ReportSink,
    accelerators: Mutex<Vec<Arc<Accelerator>>>,
    waiting: Mutex<Vec<Arc<Task>>>,
    ready_counts: Mutex<HashMap<String, i64>>,
    running: AtomicBool,
    use_cpu: AtomicBool,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(registry: Arc<AppRegistry>, config: SchedulerConfig) -> Self {
        let report = ReportSink::stdout(ReportFormat::from_csv_flag(config.csv_report));
        Self::with_report_sink(registry, config, report)
    }

    /// Construct with a custom result sink (the format argument of the sink
    /// wins over `config.csv_report`).
    pub fn with_report_sink(
        registry: Arc<AppRegistry>,
        config: SchedulerConfig,
        report: ReportSink,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            registry,
            config,
            ready: ReadyQueue::new(),
            deps: DependencyTracker::new(),
            completion: Arc::new(CompletionBus::new()),
            report,
            accelerators: Mutex::new(Vec::new()),
            waiting: Mutex::new(Vec::new()),
            ready_counts: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            use_cpu: AtomicBool::new(true),
            handles: tokio::sync::Mutex::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// The bus callers subscribe on before submitting.
    pub fn completion_bus(&self) -> Arc<CompletionBus> {
        self.completion.clone()
    }

    pub fn app_registry(&self) -> Arc<AppRegistry> {
        self.registry.clone()
    }

    pub fn add_accelerator(&self, accelerator: Accelerator) {
        self.accelerators
            .lock()
            .expect("accelerator pool lock poisoned")
            .push(Arc::new(accelerator));
    }

    /// Enqueue a task: straight to the ready queue when its dependencies are
    /// already complete, otherwise parked until the watcher promotes it.
    pub fn submit(self: &Arc<Self>, task: Arc<Task>) {
        if self.deps.deps_satisfied(&task) {
            let app = task.app.clone();
            self.ready.push(task);
            self.note_ready(&app, 1);
        } else {
            self.waiting
                .lock()
                .expect("waiting pool lock poisoned")
                .push(task);
        }
    }

    /// Spawn the worker pool and the dependency watcher. Idempotent.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let fpga_ok = self
            .snapshot_accelerators()
            .iter()
            .any(|a| a.is_reconfigurable() && a.is_available());
        let use_cpu = match self.config.backend_mode {
            BackendMode::Cpu => true,
            BackendMode::Fpga => false,
            BackendMode::Auto => !fpga_ok,
        };
        self.use_cpu.store(use_cpu, Ordering::SeqCst);

        // Bring up static shells before any task can reach a slot. Failures
        // degrade the slot, not the scheduler.
        for acc in self.snapshot_accelerators() {
            if let Some(slot) = acc.as_slot() {
                if let Err(e) = slot.prepare_static().await {
                    tracing::warn!(slot = %slot.name(), error = ?e, "static shell load failed");
                }
            }
        }

        let workers = self.config.effective_cpu_workers();
        let mut handles = self.handles.lock().await;
        for worker in 0..workers {
            handles.push(tokio::spawn(worker_loop(self.clone(), worker)));
        }
        handles.push(tokio::spawn(dependency_watcher(
            self.clone(),
            self.shutdown_tx.subscribe(),
        )));
        tracing::debug!(workers, use_cpu, "scheduler started");
    }

    /// Cooperative shutdown: in-flight tasks run to completion, queued and
    /// waiting tasks are abandoned (their completion signals stay
    /// unfulfilled). Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        self.ready.stop();
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if handle.await.is_err() {
                tracing::warn!("scheduler task panicked during shutdown");
            }
        }
        let abandoned = self
            .waiting
            .lock()
            .expect("waiting pool lock poisoned")
            .len();
        if abandoned > 0 {
            tracing::debug!(abandoned, "waiting tasks dropped at shutdown");
        }
        tracing::debug!("scheduler stopped");
    }

    fn snapshot_accelerators(&self) -> Vec<Arc<Accelerator>> {
        self.accelerators
            .lock()
            .expect("accelerator pool lock poisoned")
            .clone()
    }

    /// Maintain the per-app ready counter; a positive crossing of the
    /// preload threshold triggers an opportunistic overlay load.
    fn note_ready(self: &Arc<Self>, app: &str, delta: i64) {
        let threshold = i64::from(self.config.preload_threshold);
        let mut trigger = false;
        {
            let mut counts = self
                .ready_counts
                .lock()
                .expect("ready counts lock poisoned");
            let count = {
                let entry = counts.entry(app.to_owned()).or_insert(0);
                *entry = (*entry + delta).max(0);
                *entry
            };
            if count == 0 {
                counts.remove(app);
            } else if delta > 0 && threshold > 0 && count >= threshold {
                trigger = true;
            }
        }
        if trigger {
            let sched = self.clone();
            let app = app.to_owned();
            tokio::spawn(async move {
                sched.maybe_preload(&app).await;
            });
        }
    }

    /// Best-effort: program `app` into some idle slot that does not carry it
    /// yet. Failure is logged and otherwise ignored.
    async fn maybe_preload(&self, app: &str) {
        if self.use_cpu.load(Ordering::SeqCst) || self.config.preload_threshold == 0 {
            return;
        }
        let Some(descriptor) = self.registry.lookup(app) else {
            return;
        };
        let slots: Vec<_> = self
            .snapshot_accelerators()
            .into_iter()
            .filter(|a| a.is_available() && a.is_reconfigurable())
            .collect();
        for acc in &slots {
            if acc.current_app().await.as_deref() == Some(app) {
                return;
            }
        }
        for acc in slots {
            let Some(slot) = acc.as_slot() else { continue };
            if slot.busy() {
                continue;
            }
            match slot.ensure_loaded(&descriptor).await {
                Ok(()) => {
                    tracing::debug!(slot = %slot.name(), app, "overlay preloaded");
                    return;
                }
                Err(e) => {
                    tracing::warn!(slot = %slot.name(), app, error = ?e, "preload failed");
                }
            }
        }
    }

    /// Accelerator selection, in order: a slot that already carries the app,
    /// a slot that accepts the load, any CPU worker, any slot as a
    /// best-effort fallback.
    async fn select_accelerator(
        &self,
        task: &Task,
        app: &AppDescriptor,
    ) -> Option<Arc<Accelerator>> {
        let snapshot: Vec<_> = self
            .snapshot_accelerators()
            .into_iter()
            .filter(|a| a.is_available())
            .collect();

        if !self.use_cpu.load(Ordering::SeqCst) && task.required != ResourceKind::Cpu {
            // First a slot that already carries the overlay (no reconfig),
            // then the first slot that accepts the load.
            for acc in snapshot.iter().filter(|a| a.is_reconfigurable()) {
                if acc.current_app().await.as_deref() == Some(task.app.as_str()) {
                    return Some(acc.clone());
                }
            }
            for acc in snapshot.iter().filter(|a| a.is_reconfigurable()) {
                match acc.ensure_loaded(app).await {
                    Ok(()) => return Some(acc.clone()),
                    Err(e) => {
                        tracing::debug!(
                            accelerator = %acc.name(),
                            app = %task.app,
                            error = ?e,
                            "slot rejected overlay, trying next candidate"
                        );
                    }
                }
            }
        }
        if let Some(cpu) = snapshot.iter().find(|a| !a.is_reconfigurable()) {
            return Some(cpu.clone());
        }
        if let Some(slot) = snapshot.iter().find(|a| a.is_reconfigurable()) {
            return Some(slot.clone());
        }
        None
    }

    /// Report the result, release dependents on success, and fulfil the
    /// completion signal. Runs exactly once per popped task.
    fn finish(&self, task: &Task, result: ExecutionResult) {
        if !result.ok {
            tracing::warn!(task = task.id, message = %result.message, "task failed");
        }
        self.report.report(&result);
        if result.ok {
            self.deps.mark_complete(task.id);
        }
        self.completion.fulfill(task.id, result.ok);
    }
}

async fn worker_loop(sched: Arc<Scheduler>, worker: usize) {
    tracing::trace!(worker, "worker started");
    while let Some(task) = sched.ready.pop().await {
        sched.note_ready(&task.app, -1);

        let Some(app) = sched.registry.lookup(&task.app) else {
            sched.finish(
                &task,
                ExecutionResult::rejected(task.id, format!("Unknown app: {}", task.app)),
            );
            continue;
        };
        let Some(accelerator) = sched.select_accelerator(&task, &app).await else {
            sched.finish(
                &task,
                ExecutionResult::rejected(task.id, "No accelerator available"),
            );
            continue;
        };
        tracing::trace!(
            worker,
            task = task.id,
            accelerator = %accelerator.name(),
            "dispatching"
        );
        let result = accelerator.run(&task, &app).await;
        sched.finish(&task, result);
    }
    tracing::trace!(worker, "worker exited");
}

/// Promotes waiting tasks whose dependencies have completed. Polling keeps
/// the tracker trivial; the tick is short enough that promotion latency is
/// noise next to kernel runtimes.
async fn dependency_watcher(sched: Arc<Scheduler>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(WATCHER_TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = tick.tick() => {
                let promoted: Vec<Arc<Task>> = {
                    let mut waiting = sched
                        .waiting
                        .lock()
                        .expect("waiting pool lock poisoned");
                    let mut still_waiting = Vec::with_capacity(waiting.len());
                    let mut ready = Vec::new();
                    for task in waiting.drain(..) {
                        if sched.deps.deps_satisfied(&task) {
                            ready.push(task);
                        } else {
                            still_waiting.push(task);
                        }
                    }
                    *waiting = still_waiting;
                    ready
                };
                for task in promoted {
                    tracing::trace!(task = task.id, "dependencies satisfied, promoting");
                    let app = task.app.clone();
                    sched.ready.push(task);
                    sched.note_ready(&app, 1);
                }
            }
        }
    }
    tracing::trace!("dependency watcher exited");
}
