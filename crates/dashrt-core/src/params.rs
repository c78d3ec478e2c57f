use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::contexts::{FftContext, SharedFftContext, SharedZipContext, ZipContext};

/// Key under which an FFT kernel context is attached to a task.
pub const FFT_CONTEXT_KEY: &str = "dash.fft_ctx";
/// Key under which a zip kernel context is attached to a task.
pub const ZIP_CONTEXT_KEY: &str = "dash.zip_ctx";

/// One entry in a task's parameter map.
///
/// Kernel contexts are carried as typed shared handles instead of
/// stringified pointers; plain `Text` covers everything else an embedding
/// application wants to pin to a task.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Fft(SharedFftContext),
    Zip(SharedZipContext),
    Text(String),
}

/// String-keyed parameter payload attached to a task.
#[derive(Debug, Clone, Default)]
pub struct TaskParams {
    entries: HashMap<String, ParamValue>,
}

impl TaskParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ParamValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attach an FFT context under its canonical key, returning the shared
    /// handle the caller keeps for reading results back.
    pub fn attach_fft(&mut self, ctx: FftContext) -> SharedFftContext {
        let shared = Arc::new(Mutex::new(ctx));
        self.insert(FFT_CONTEXT_KEY, ParamValue::Fft(shared.clone()));
        shared
    }

    /// Attach a zip context under its canonical key.
    pub fn attach_zip(&mut self, ctx: ZipContext) -> SharedZipContext {
        let shared = Arc::new(Mutex::new(ctx));
        self.insert(ZIP_CONTEXT_KEY, ParamValue::Zip(shared.clone()));
        shared
    }

    /// The FFT context under the canonical key, if one is attached.
    pub fn fft_ctx(&self) -> Option<SharedFftContext> {
        match self.entries.get(FFT_CONTEXT_KEY) {
            Some(ParamValue::Fft(ctx)) => Some(ctx.clone()),
            _ => None,
        }
    }

    /// The zip context under the canonical key, if one is attached.
    pub fn zip_ctx(&self) -> Option<SharedZipContext> {
        match self.entries.get(ZIP_CONTEXT_KEY) {
            Some(ParamValue::Zip(ctx)) => Some(ctx.clone()),
            _ => None,
        }
    }
}
