//! Scheduling and accelerator-routing engine for the DASH runtime.
//!
//! The [`Scheduler`] owns a pool of accelerators (CPU workers and FPGA
//! slots), a priority-ordered ready queue, a waiting pool watched for
//! dependency completion, and a completion bus that delivers one-shot
//! signals back to submitters. Workers pop the highest-priority ready task,
//! route it to an accelerator (programming overlays on demand), and report
//! the outcome.

mod accelerator;
mod completion;
mod deps;
mod error;
mod fft_hw;
mod ready_queue;
mod report;
mod scheduler;

pub use accelerator::{Accelerator, CpuWorker, FpgaSlot, FpgaSlotOptions, SlotPhase};
pub use completion::CompletionBus;
pub use deps::DependencyTracker;
pub use error::{Result, SlotError};
pub use fft_hw::{FftDmaRunner, FftHwConfig};
pub use ready_queue::ReadyQueue;
pub use report::{ReportFormat, ReportSink, SharedLineBuffer};
pub use scheduler::Scheduler;
