use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// FFT shape: transform length and direction. `n = 0` means "infer from the
/// shorter of the two buffers".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FftPlan {
    pub n: usize,
    pub inverse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZipMode {
    Compress,
    Decompress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipParams {
    /// zlib level, clamped to 0..=9 at execution time.
    pub level: i32,
    pub mode: ZipMode,
}

impl Default for ZipParams {
    fn default() -> Self {
        Self {
            level: 3,
            mode: ZipMode::Compress,
        }
    }
}

/// Kernel working set for one FFT task. The façade fills `input` and sizes
/// `output`; the kernel (CPU or DMA runner) writes `output`, `ok`, and
/// `message`.
#[derive(Debug, Default)]
pub struct FftContext {
    pub plan: FftPlan,
    pub input: Vec<f32>,
    pub output: Vec<f32>,
    pub ok: bool,
    pub message: String,
}

impl FftContext {
    pub fn new(plan: FftPlan, input: Vec<f32>, output_len: usize) -> Self {
        Self {
            plan,
            input,
            output: vec![0.0; output_len],
            ok: false,
            message: String::new(),
        }
    }
}

/// Kernel working set for one zip task. `output` is sized to the caller's
/// capacity; `out_actual` reports how much of it the kernel produced.
#[derive(Debug, Default)]
pub struct ZipContext {
    pub params: ZipParams,
    pub input: Vec<u8>,
    pub output: Vec<u8>,
    pub out_actual: usize,
    pub ok: bool,
    pub message: String,
}

impl ZipContext {
    pub fn new(params: ZipParams, input: Vec<u8>, output_capacity: usize) -> Self {
        Self {
            params,
            input,
            output: vec![0; output_capacity],
            out_actual: 0,
            ok: false,
            message: String::new(),
        }
    }
}

/// Contexts travel inside [`TaskParams`](crate::TaskParams) and are mutated
/// by whichever worker ends up running the kernel, so they are shared behind
/// a mutex rather than as raw pointers.
pub type SharedFftContext = Arc<Mutex<FftContext>>;
pub type SharedZipContext = Arc<Mutex<ZipContext>>;
