use std::io::Write;
use std::sync::{Arc, Mutex};

use dashrt_core::ExecutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// `[RESULT] Task <id> ok=<bool> msg="<message>" time_ns=<int>`
    Plain,
    /// `<id>,<0|1>,<message>,<time_ns>`
    Csv,
}

impl ReportFormat {
    pub fn from_csv_flag(csv: bool) -> Self {
        if csv {
            Self::Csv
        } else {
            Self::Plain
        }
    }
}

/// Destination for the one-line-per-task result stream.
pub struct ReportSink {
    format: ReportFormat,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ReportSink {
    pub fn stdout(format: ReportFormat) -> Self {
        Self::to_writer(format, Box::new(std::io::stdout()))
    }

    pub fn to_writer(format: ReportFormat, writer: Box<dyn Write + Send>) -> Self {
        Self {
            format,
            writer: Mutex::new(writer),
        }
    }

    pub fn report(&self, result: &ExecutionResult) {
        let line = match self.format {
            ReportFormat::Plain => format!(
                "[RESULT] Task {} ok={} msg=\"{}\" time_ns={}",
                result.id,
                result.ok,
                result.message,
                result.runtime.as_nanos()
            ),
            ReportFormat::Csv => format!(
                "{},{},{},{}",
                result.id,
                u8::from(result.ok),
                result.message,
                result.runtime.as_nanos()
            ),
        };
        let mut writer = self.writer.lock().expect("report sink lock poisoned");
        if writeln!(writer, "{line}").and_then(|()| writer.flush()).is_err() {
            tracing::warn!(task = result.id, "failed to emit result line");
        }
    }
}

impl Default for ReportSink {
    fn default() -> Self {
        Self::stdout(ReportFormat::Plain)
    }
}

/// An in-memory report destination: hand `Box::new(buffer.clone())` to
/// [`ReportSink::to_writer`] and read the accumulated lines back later.
/// Embedding applications use it to attach result streams to their own
/// diagnostics; the test suites use it to assert on report ordering.
#[derive(Debug, Clone, Default)]
pub struct SharedLineBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock().expect("line buffer lock poisoned")).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl Write for SharedLineBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes
            .lock()
            .expect("line buffer lock poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
