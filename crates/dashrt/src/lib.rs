//! DASH: a heterogeneous task-scheduling runtime.
//!
//! Applications build a [`DashRuntime`], register apps, providers, and
//! accelerators, and either submit tasks directly through the scheduler or
//! call the synchronous-style façades ([`DashRuntime::fft_execute`],
//! [`DashRuntime::zip_execute`]) that hide task construction and completion
//! plumbing entirely.
//!
//! ```no_run
//! use dashrt::{AppDescriptor, CpuWorker, Accelerator, DashRuntime, Provider, ResourceKind,
//!     SchedulerConfig, ZipParams};
//!
//! # async fn demo() {
//! let runtime = DashRuntime::new(SchedulerConfig::default());
//! runtime.register_app(AppDescriptor {
//!     app: "zip".into(),
//!     bitstream_path: String::new(),
//!     kernel_name: "zip_kernel".into(),
//!     kind: ResourceKind::Cpu,
//! });
//! runtime.register_provider(Provider {
//!     op: "zip".into(),
//!     kind: ResourceKind::Cpu,
//!     instance_id: 0,
//!     priority: 10,
//! });
//! runtime.add_accelerator(Accelerator::CpuWorker(CpuWorker::new(0)));
//! runtime.start().await;
//!
//! let input = b"hello hello hello".to_vec();
//! let mut output = vec![0u8; 256];
//! let mut out_len = 0;
//! let ok = runtime
//!     .zip_execute(ZipParams::default(), &input, &mut output, &mut out_len)
//!     .await;
//! assert!(ok);
//! runtime.stop().await;
//! # }
//! ```

mod facade;

pub use dashrt_core::{
    AppDescriptor, AppRegistry, BackendMode, ExecutionResult, FftContext, FftPlan, ParamValue,
    Provider, ProviderRegistry, ResourceKind, SchedulerConfig, Task, TaskId, TaskParams,
    ZipContext, ZipMode, ZipParams, FFT_CONTEXT_KEY, ZIP_CONTEXT_KEY,
};
pub use dashrt_sched::{
    Accelerator, CompletionBus, CpuWorker, FpgaSlot, FpgaSlotOptions, ReportFormat, ReportSink,
    Scheduler,
};

pub use facade::DashRuntime;
