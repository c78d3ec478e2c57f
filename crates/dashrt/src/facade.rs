use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashrt_core::{
    AppDescriptor, AppRegistry, FftContext, FftPlan, Provider, ProviderRegistry, ResourceKind,
    SchedulerConfig, Task, TaskId, TaskParams, ZipContext, ZipParams,
};
use dashrt_sched::{Accelerator, ReportSink, Scheduler};

/// Conservative runtime hints for tasks built by the façades; real kernels
/// finish early, mock paths sleep this long.
const FFT_EST_RUNTIME: Duration = Duration::from_millis(15);
const ZIP_EST_RUNTIME: Duration = Duration::from_millis(12);

/// Conventional provider preferences: hardware overlays first, CPU kernels
/// as the fallback.
const HW_PROVIDER_PRIORITY: i32 = 0;
const CPU_PROVIDER_PRIORITY: i32 = 10;

/// Everything an application needs in one place: the app and provider
/// registries, the scheduler, and a process-wide task id counter. There are
/// no globals; drop the runtime and all of it goes away.
pub struct DashRuntime {
    apps: Arc<AppRegistry>,
    providers: Arc<ProviderRegistry>,
    scheduler: Arc<Scheduler>,
    next_id: AtomicU64,
    next_instance: AtomicU32,
}

impl DashRuntime {
    pub fn new(config: SchedulerConfig) -> Self {
        let apps = Arc::new(AppRegistry::new());
        let scheduler = Arc::new(Scheduler::new(apps.clone(), config));
        Self::assemble(apps, scheduler)
    }

    /// Construct with a custom result sink.
    pub fn with_report_sink(config: SchedulerConfig, sink: ReportSink) -> Self {
        let apps = Arc::new(AppRegistry::new());
        let scheduler = Arc::new(Scheduler::with_report_sink(apps.clone(), config, sink));
        Self::assemble(apps, scheduler)
    }

    fn assemble(apps: Arc<AppRegistry>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            apps,
            providers: Arc::new(ProviderRegistry::new()),
            scheduler,
            next_id: AtomicU64::new(1),
            next_instance: AtomicU32::new(0),
        }
    }

    pub fn app_registry(&self) -> &Arc<AppRegistry> {
        &self.apps
    }

    pub fn provider_registry(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn register_app(&self, descriptor: AppDescriptor) {
        self.apps.register_app(descriptor);
    }

    pub fn register_provider(&self, provider: Provider) {
        self.providers.register(provider);
    }

    /// Register an app together with the conventional provider pair: the
    /// hardware overlay at priority 0 (when the descriptor names a non-CPU
    /// kind) and a CPU fallback at priority 10.
    pub fn register_app_with_providers(&self, descriptor: AppDescriptor) {
        let op = descriptor.app.clone();
        let kind = descriptor.kind;
        self.apps.register_app(descriptor);
        if kind != ResourceKind::Cpu {
            self.providers.register(Provider {
                op: op.clone(),
                kind,
                instance_id: self.next_instance.fetch_add(1, Ordering::Relaxed),
                priority: HW_PROVIDER_PRIORITY,
            });
        }
        self.providers.register(Provider {
            op,
            kind: ResourceKind::Cpu,
            instance_id: self.next_instance.fetch_add(1, Ordering::Relaxed),
            priority: CPU_PROVIDER_PRIORITY,
        });
    }

    pub fn add_accelerator(&self, accelerator: Accelerator) {
        self.scheduler.add_accelerator(accelerator);
    }

    pub async fn start(&self) {
        self.scheduler.start().await;
    }

    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    /// Allocate a task id from the runtime-wide monotonic counter.
    pub fn next_task_id(&self) -> TaskId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Submit a caller-built task, returning the receiver for its
    /// completion signal (subscribed before submission, so it cannot miss).
    pub fn submit(&self, task: Task) -> tokio::sync::oneshot::Receiver<bool> {
        let rx = self.scheduler.completion_bus().subscribe(task.id);
        self.scheduler.submit(Arc::new(task));
        rx
    }

    /// Run one FFT through the runtime: pick the preferred provider, build
    /// and submit the task, wait for completion, copy the transform into
    /// `output`. Returns overall success (scheduling and kernel both ok).
    pub async fn fft_execute(&self, plan: FftPlan, input: &[f32], output: &mut [f32]) -> bool {
        let providers = self.providers.providers_for("fft");
        let Some(preferred) = providers.first() else {
            tracing::warn!("fft_execute with no registered fft provider");
            return false;
        };

        let mut params = TaskParams::new();
        let ctx = params.attach_fft(FftContext::new(plan, input.to_vec(), output.len()));

        let task = Task::new(self.next_task_id(), "fft")
            .with_required(preferred.kind)
            .with_params(params)
            .with_est_runtime(FFT_EST_RUNTIME);
        let delivered = self.submit(task).await.unwrap_or(false);

        let guard = ctx.lock().expect("fft context lock poisoned");
        output.copy_from_slice(&guard.output);
        delivered && guard.ok
    }

    /// Run one zip operation through the runtime. `out_len` receives the
    /// number of bytes produced into `output`.
    pub async fn zip_execute(
        &self,
        zip_params: ZipParams,
        input: &[u8],
        output: &mut [u8],
        out_len: &mut usize,
    ) -> bool {
        let providers = self.providers.providers_for("zip");
        let Some(preferred) = providers.first() else {
            tracing::warn!("zip_execute with no registered zip provider");
            return false;
        };

        let mut params = TaskParams::new();
        let ctx = params.attach_zip(ZipContext::new(zip_params, input.to_vec(), output.len()));

        let task = Task::new(self.next_task_id(), "zip")
            .with_required(preferred.kind)
            .with_params(params)
            .with_est_runtime(ZIP_EST_RUNTIME);
        let delivered = self.submit(task).await.unwrap_or(false);

        let guard = ctx.lock().expect("zip context lock poisoned");
        let produced = guard.out_actual.min(output.len());
        output[..produced].copy_from_slice(&guard.output[..produced]);
        *out_len = guard.out_actual;
        delivered && guard.ok
    }
}
