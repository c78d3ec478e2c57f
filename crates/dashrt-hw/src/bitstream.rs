use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use error_stack::ResultExt as _;
use futures::future::BoxFuture;
use futures::FutureExt as _;

use crate::error::{HwError, Result};
use crate::gpio::DecoupleGpio;

/// Programs bitstreams into an FPGA region.
///
/// The scheduling core only consumes this contract; the sysfs implementation
/// below is the platform collaborator, and the mock stands in for it in
/// tests and on development hosts.
pub trait BitstreamLoader: Send + Sync {
    /// Program `path`. `partial` selects overlay loading (decoupled from the
    /// static shell) versus a full static-shell load.
    fn load<'a>(&'a self, path: &'a Path, partial: bool) -> BoxFuture<'a, Result<()>>;

    /// Whether the underlying manager device exists at all.
    fn is_present(&self) -> bool;
}

/// Loader backed by the Linux FPGA manager sysfs interface: writes the
/// firmware name to the manager node, toggles the decouple signal around
/// partial loads, and polls the state node until the manager reports
/// `operating`.
pub struct SysfsBitstreamLoader {
    manager_path: PathBuf,
    state_path: Option<PathBuf>,
    decouple: Option<DecoupleGpio>,
    load_timeout: Duration,
}

impl SysfsBitstreamLoader {
    pub fn new(manager_path: impl Into<PathBuf>) -> Self {
        let manager_path = manager_path.into();
        let state_path = manager_path.parent().map(|dir| dir.join("state"));
        Self {
            manager_path,
            state_path,
            decouple: None,
            load_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_decouple(mut self, decouple: DecoupleGpio) -> Self {
        self.decouple = Some(decouple);
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    fn write_firmware(&self, path: &Path) -> Result<()> {
        let name = path.display().to_string();
        std::fs::write(&self.manager_path, format!("{name}\n"))
            .change_context(HwError::BitstreamLoad { path: name.clone() })
            .attach_printable_lazy(|| {
                format!("manager node {}", self.manager_path.display())
            })?;
        tracing::debug!(bitstream = %name, "requested reconfiguration");
        Ok(())
    }

    async fn wait_operating(&self, path: &Path) -> Result<()> {
        let Some(state_path) = &self.state_path else {
            return Ok(());
        };
        if !state_path.exists() {
            // Older managers expose no state node; the write itself is the
            // only completion signal we get.
            return Ok(());
        }
        let deadline = tokio::time::Instant::now() + self.load_timeout;
        loop {
            let state = std::fs::read_to_string(state_path).unwrap_or_default();
            if state.trim() == "operating" {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(error_stack::report!(HwError::BitstreamLoad {
                    path: path.display().to_string(),
                })
                .attach_printable(format!("manager state '{}' after timeout", state.trim())));
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

impl BitstreamLoader for SysfsBitstreamLoader {
    fn load<'a>(&'a self, path: &'a Path, partial: bool) -> BoxFuture<'a, Result<()>> {
        async move {
            if partial {
                if let Some(decouple) = &self.decouple {
                    decouple.assert().await.change_context(HwError::BitstreamLoad {
                        path: path.display().to_string(),
                    })?;
                }
            }
            let result = async {
                self.write_firmware(path)?;
                self.wait_operating(path).await
            }
            .await;
            if partial {
                if let Some(decouple) = &self.decouple {
                    // Always release, even after a failed write; the region
                    // must not stay isolated.
                    if let Err(e) = decouple.release().await {
                        tracing::warn!(error = ?e, "failed to release decouple signal");
                    }
                }
            }
            result
        }
        .boxed()
    }

    fn is_present(&self) -> bool {
        self.manager_path.exists()
    }
}

/// One recorded call to [`MockBitstreamLoader::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRecord {
    pub path: PathBuf,
    pub partial: bool,
}

/// Loader that never touches hardware. Records every load so tests can
/// observe reconfiguration traffic, and can be scripted to fail for
/// specific bitstream paths (or for everything).
#[derive(Debug, Default)]
pub struct MockBitstreamLoader {
    loads: Mutex<Vec<LoadRecord>>,
    fail_paths: Mutex<Vec<PathBuf>>,
    fail_all: std::sync::atomic::AtomicBool,
}

impl MockBitstreamLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent load fail.
    pub fn fail_all(&self) {
        self.fail_all
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Make loads of `path` fail.
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.fail_paths
            .lock()
            .expect("mock loader lock poisoned")
            .push(path.into());
    }

    /// Everything loaded so far, in order.
    pub fn loads(&self) -> Vec<LoadRecord> {
        self.loads.lock().expect("mock loader lock poisoned").clone()
    }

    pub fn load_count(&self) -> usize {
        self.loads.lock().expect("mock loader lock poisoned").len()
    }
}

impl BitstreamLoader for MockBitstreamLoader {
    fn load<'a>(&'a self, path: &'a Path, partial: bool) -> BoxFuture<'a, Result<()>> {
        async move {
            let should_fail = self.fail_all.load(std::sync::atomic::Ordering::SeqCst)
                || self
                    .fail_paths
                    .lock()
                    .expect("mock loader lock poisoned")
                    .iter()
                    .any(|p| p == path);
            if should_fail {
                return Err(error_stack::report!(HwError::BitstreamLoad {
                    path: path.display().to_string(),
                }));
            }
            self.loads
                .lock()
                .expect("mock loader lock poisoned")
                .push(LoadRecord {
                    path: path.to_path_buf(),
                    partial,
                });
            tracing::debug!(bitstream = %path.display(), partial, "mock load");
            Ok(())
        }
        .boxed()
    }

    fn is_present(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_loader_records_loads() {
        let loader = MockBitstreamLoader::new();
        loader
            .load(Path::new("bitstreams/fft_partial.bin"), true)
            .await
            .unwrap();
        loader
            .load(Path::new("bitstreams/shell.bin"), false)
            .await
            .unwrap();

        let loads = loader.loads();
        assert_eq!(loads.len(), 2);
        assert!(loads[0].partial);
        assert!(!loads[1].partial);
        assert_eq!(loads[0].path, Path::new("bitstreams/fft_partial.bin"));
    }

    #[tokio::test]
    async fn mock_loader_scripted_failure() {
        let loader = MockBitstreamLoader::new();
        loader.fail_on("bitstreams/bad.bin");

        assert!(loader.load(Path::new("bitstreams/bad.bin"), true).await.is_err());
        assert!(loader.load(Path::new("bitstreams/good.bin"), true).await.is_ok());
        // Failed loads are not recorded.
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn sysfs_loader_writes_manager_node() {
        let dir = std::env::temp_dir().join(format!("dashrt-fpga-mgr-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let manager = dir.join("firmware");
        std::fs::write(&manager, "").unwrap();
        std::fs::write(dir.join("state"), "operating\n").unwrap();

        let loader = SysfsBitstreamLoader::new(manager.clone());
        assert!(loader.is_present());
        loader
            .load(Path::new("overlays/zip_partial.bin"), true)
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&manager).unwrap(),
            "overlays/zip_partial.bin\n"
        );
    }

    #[tokio::test]
    async fn sysfs_loader_times_out_on_stuck_state() {
        let dir = std::env::temp_dir().join(format!("dashrt-fpga-stuck-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let manager = dir.join("firmware");
        std::fs::write(&manager, "").unwrap();
        std::fs::write(dir.join("state"), "write init\n").unwrap();

        let loader = SysfsBitstreamLoader::new(manager.clone())
            .with_load_timeout(Duration::from_millis(20));
        assert!(loader.load(Path::new("overlays/slow.bin"), false).await.is_err());
    }
}
