use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashrt_core::{AppDescriptor, ExecutionResult, ResourceKind, Task};
use dashrt_hw::{BitstreamLoader, MockBitstreamLoader};
use error_stack::ResultExt as _;

use crate::error::{Result, SlotError};
use crate::fft_hw::FftDmaRunner;

/// An execution resource the scheduler can route tasks to.
///
/// A tagged variant rather than a trait object: the preload heuristic and
/// backend probing locate reconfigurable slots by matching on the variant.
pub enum Accelerator {
    CpuWorker(CpuWorker),
    FpgaSlot(FpgaSlot),
}

impl Accelerator {
    pub fn name(&self) -> &str {
        match self {
            Self::CpuWorker(w) => w.name(),
            Self::FpgaSlot(s) => s.name(),
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            Self::CpuWorker(_) => true,
            Self::FpgaSlot(s) => s.is_available(),
        }
    }

    pub fn is_reconfigurable(&self) -> bool {
        matches!(self, Self::FpgaSlot(_))
    }

    /// The overlay currently programmed, for slots. CPU workers have none.
    pub async fn current_app(&self) -> Option<String> {
        match self {
            Self::CpuWorker(_) => None,
            Self::FpgaSlot(s) => s.current_app().await,
        }
    }

    pub async fn prepare_static(&self) -> Result<()> {
        match self {
            Self::CpuWorker(_) => Ok(()),
            Self::FpgaSlot(s) => s.prepare_static().await,
        }
    }

    pub async fn ensure_loaded(&self, app: &AppDescriptor) -> Result<()> {
        match self {
            Self::CpuWorker(_) => Ok(()),
            Self::FpgaSlot(s) => s.ensure_loaded(app).await,
        }
    }

    pub async fn run(&self, task: &Task, app: &AppDescriptor) -> ExecutionResult {
        match self {
            Self::CpuWorker(w) => w.run(task, app).await,
            Self::FpgaSlot(s) => s.run(task, app).await,
        }
    }

    pub fn as_slot(&self) -> Option<&FpgaSlot> {
        match self {
            Self::CpuWorker(_) => None,
            Self::FpgaSlot(s) => Some(s),
        }
    }
}

/// A CPU worker: always available, nothing to load. Runs the software
/// kernel when the task carries a matching context; otherwise sleeps for
/// the task's estimated runtime, which is what dependency-graph tests lean
/// on.
pub struct CpuWorker {
    name: String,
}

impl CpuWorker {
    pub fn new(id: u32) -> Self {
        Self {
            name: format!("cpu-worker-{id}"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, task: &Task, app: &AppDescriptor) -> ExecutionResult {
        let start = Instant::now();
        let (ok, message) = if let Some(ctx) = task.params.zip_ctx() {
            let kernel_ctx = ctx.clone();
            let ok = tokio::task::spawn_blocking(move || {
                let mut guard = kernel_ctx.lock().expect("zip context lock poisoned");
                dashrt_kernels::zip::run(&mut guard)
            })
            .await
            .unwrap_or(false);
            let message = ctx.lock().expect("zip context lock poisoned").message.clone();
            (ok, message)
        } else if let Some(ctx) = task.params.fft_ctx() {
            let kernel_ctx = ctx.clone();
            let ok = tokio::task::spawn_blocking(move || {
                let mut guard = kernel_ctx.lock().expect("fft context lock poisoned");
                dashrt_kernels::fft::run(&mut guard)
            })
            .await
            .unwrap_or(false);
            let message = ctx.lock().expect("fft context lock poisoned").message.clone();
            (ok, message)
        } else {
            let dur = if task.est_runtime.is_zero() {
                Duration::from_millis(10)
            } else {
                task.est_runtime
            };
            tokio::time::sleep(dur).await;
            (true, format!("Executed {} on {}", app.app, self.name))
        };
        ExecutionResult {
            id: task.id,
            ok,
            message,
            runtime: start.elapsed(),
            worker: self.name.clone(),
        }
    }
}

/// Construction options for one FPGA slot.
pub struct FpgaSlotOptions {
    /// Skip real hardware work in `run`: every task just sleeps its
    /// estimated runtime. Loads still go through the (mock) loader.
    pub mock_mode: bool,
    /// Static shell image, loaded once by `prepare_static`. Empty means the
    /// shell is already resident.
    pub static_bitstream: String,
    /// Emit verbose state transitions for this slot.
    pub debug_logging: bool,
    /// Hardware FFT path; absent means the CPU kernel handles `fft` tasks
    /// that land on this slot.
    pub fft_runner: Option<Arc<FftDmaRunner>>,
}

impl Default for FpgaSlotOptions {
    fn default() -> Self {
        Self {
            mock_mode: true,
            static_bitstream: String::new(),
            debug_logging: false,
            fft_runner: None,
        }
    }
}

/// Lifecycle of one reconfigurable region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    Uninitialized,
    StaticLoaded,
    Programmed,
    /// The last overlay load failed. The next `ensure_loaded` re-attempts;
    /// until one succeeds the slot carries no overlay.
    Failed,
}

#[derive(Debug)]
struct SlotState {
    phase: SlotPhase,
    current_app: Option<String>,
    current_kind: ResourceKind,
    static_loaded: bool,
}

/// One FPGA partial-reconfiguration region.
///
/// Two locks: `state` (the load-side state machine) and `run_mu` (execution
/// serialization). They are separate so an opportunistic preload on this
/// slot can proceed while a different slot executes, and so the scheduler
/// can program this slot while it is idle.
pub struct FpgaSlot {
    slot_id: u32,
    name: String,
    options: FpgaSlotOptions,
    loader: Arc<dyn BitstreamLoader>,
    state: tokio::sync::Mutex<SlotState>,
    run_mu: tokio::sync::Mutex<()>,
    executing: AtomicBool,
}

impl FpgaSlot {
    pub fn new(slot_id: u32, options: FpgaSlotOptions, loader: Arc<dyn BitstreamLoader>) -> Self {
        Self {
            slot_id,
            name: format!("fpga-slot-{slot_id}"),
            options,
            loader,
            state: tokio::sync::Mutex::new(SlotState {
                phase: SlotPhase::Uninitialized,
                current_app: None,
                current_kind: ResourceKind::Cpu,
                static_loaded: false,
            }),
            run_mu: tokio::sync::Mutex::new(()),
            executing: AtomicBool::new(false),
        }
    }

    /// A fully mocked slot: mock loader, mock mode, no hardware FFT path.
    pub fn mock(slot_id: u32) -> Self {
        Self::new(
            slot_id,
            FpgaSlotOptions::default(),
            Arc::new(MockBitstreamLoader::new()),
        )
    }

    /// Mocked slot sharing a caller-held loader, so tests can observe and
    /// script reconfiguration traffic.
    pub fn mock_with_loader(slot_id: u32, loader: Arc<MockBitstreamLoader>) -> Self {
        Self::new(slot_id, FpgaSlotOptions::default(), loader)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot_id(&self) -> u32 {
        self.slot_id
    }

    pub fn is_available(&self) -> bool {
        self.options.mock_mode || self.loader.is_present()
    }

    /// Whether a task is executing right now. The preload heuristic skips
    /// busy slots.
    pub fn busy(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    pub async fn current_app(&self) -> Option<String> {
        self.state.lock().await.current_app.clone()
    }

    pub async fn current_kind(&self) -> ResourceKind {
        self.state.lock().await.current_kind
    }

    pub async fn phase(&self) -> SlotPhase {
        self.state.lock().await.phase
    }

    /// Load the static shell. Idempotent once succeeded; a no-op when no
    /// shell image is configured.
    pub async fn prepare_static(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.static_loaded || self.options.static_bitstream.is_empty() {
            return Ok(());
        }
        self.debug(format_args!(
            "loading static shell {}",
            self.options.static_bitstream
        ));
        self.loader
            .load(Path::new(&self.options.static_bitstream), false)
            .await
            .change_context(SlotError::StaticLoad {
                path: self.options.static_bitstream.clone(),
            })?;
        state.static_loaded = true;
        if state.phase == SlotPhase::Uninitialized {
            state.phase = SlotPhase::StaticLoaded;
        }
        tracing::debug!(slot = %self.name, shell = %self.options.static_bitstream, "static shell loaded");
        Ok(())
    }

    /// Make sure `app`'s overlay is the one programmed into this region.
    /// No-op when it already is. On load failure the slot forgets its
    /// overlay and records the failed phase; the task that needed the app
    /// fails, and the next task for the same app re-attempts the load.
    pub async fn ensure_loaded(&self, app: &AppDescriptor) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.current_app.as_deref() == Some(app.app.as_str()) {
            return Ok(());
        }
        self.debug(format_args!(
            "ensure_loaded app={} kind={} bitstream={}",
            app.app, app.kind, app.bitstream_path
        ));
        if app.bitstream_path.is_empty() {
            // Overlay-less apps (CPU kernels probed through a slot) have
            // nothing to program.
            state.current_app = Some(app.app.clone());
            state.current_kind = app.kind;
            state.phase = SlotPhase::Programmed;
            return Ok(());
        }
        match self
            .loader
            .load(Path::new(&app.bitstream_path), true)
            .await
        {
            Ok(()) => {
                state.current_app = Some(app.app.clone());
                state.current_kind = app.kind;
                state.phase = SlotPhase::Programmed;
                tracing::debug!(slot = %self.name, app = %app.app, "overlay loaded");
                Ok(())
            }
            Err(e) => {
                state.current_app = None;
                state.phase = SlotPhase::Failed;
                tracing::warn!(slot = %self.name, app = %app.app, "overlay load failed");
                Err(e.change_context(SlotError::OverlayLoad {
                    app: app.app.clone(),
                }))
            }
        }
    }

    async fn run(&self, task: &Task, app: &AppDescriptor) -> ExecutionResult {
        let _serialized = self.run_mu.lock().await;
        self.executing.store(true, Ordering::SeqCst);
        let result = self.run_serialized(task, app).await;
        self.executing.store(false, Ordering::SeqCst);
        result
    }

    async fn run_serialized(&self, task: &Task, app: &AppDescriptor) -> ExecutionResult {
        self.debug(format_args!("run task id={} app={}", task.id, task.app));
        if self.ensure_loaded(app).await.is_err() {
            return ExecutionResult {
                id: task.id,
                ok: false,
                message: format!("Failed to ensure {} on {}", app.app, self.name),
                runtime: Duration::ZERO,
                worker: self.name.clone(),
            };
        }
        let start = Instant::now();
        let (ok, message) = if !self.options.mock_mode && task.app == "fft" {
            self.run_fft(task).await
        } else {
            let dur = if task.est_runtime.is_zero() {
                Duration::from_millis(15)
            } else {
                task.est_runtime
            };
            tokio::time::sleep(dur).await;
            (true, format!("Executed {} on {}", app.app, self.name))
        };
        ExecutionResult {
            id: task.id,
            ok,
            message,
            runtime: start.elapsed(),
            worker: self.name.clone(),
        }
    }

    /// Hardware FFT with CPU fallback on the same context. The slot stays
    /// usable either way; only the task's message records which path ran.
    async fn run_fft(&self, task: &Task) -> (bool, String) {
        let Some(ctx) = task.params.fft_ctx() else {
            self.debug(format_args!("fft task {} missing execution context", task.id));
            return (false, "fft: missing execution context".to_owned());
        };
        if let Some(runner) = &self.options.fft_runner {
            if runner.is_ready() && runner.execute(&ctx).await {
                let guard = ctx.lock().expect("fft context lock poisoned");
                return (guard.ok, guard.message.clone());
            }
        }
        self.debug(format_args!("fft task {} falling back to CPU path", task.id));
        let kernel_ctx = ctx.clone();
        let ok = tokio::task::spawn_blocking(move || {
            let mut guard = kernel_ctx.lock().expect("fft context lock poisoned");
            dashrt_kernels::fft::run(&mut guard)
        })
        .await
        .unwrap_or(false);
        let message = {
            let guard = ctx.lock().expect("fft context lock poisoned");
            format!("{} (cpu fallback)", guard.message)
        };
        (ok, message)
    }

    fn debug(&self, msg: std::fmt::Arguments<'_>) {
        if self.options.debug_logging {
            tracing::debug!(slot = %self.name, "{msg}");
        }
    }
}
