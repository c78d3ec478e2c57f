use std::path::{Path, PathBuf};
use std::time::Duration;

use error_stack::ResultExt as _;

use crate::error::{HwError, Result};

/// Wiring of the per-slot decouple signal.
#[derive(Debug, Clone)]
pub struct DecoupleGpioConfig {
    pub number: u32,
    pub active_low: bool,
    /// How long to let the signal settle after each edge.
    pub settle: Duration,
}

impl DecoupleGpioConfig {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            active_low: false,
            settle: Duration::from_millis(5),
        }
    }
}

/// Sysfs driver for the decouple signal that isolates a reconfigurable
/// region from the static shell during partial reconfiguration.
///
/// The GPIO is exported and configured lazily on first use; `assert` and
/// `release` then only touch the value node.
#[derive(Debug)]
pub struct DecoupleGpio {
    config: DecoupleGpioConfig,
    sysfs_root: PathBuf,
    value_path: std::sync::OnceLock<PathBuf>,
}

impl DecoupleGpio {
    pub fn new(config: DecoupleGpioConfig) -> Self {
        Self::with_sysfs_root(config, "/sys/class/gpio")
    }

    /// Rooted constructor so tests can point at a scratch directory.
    pub fn with_sysfs_root(config: DecoupleGpioConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            sysfs_root: root.into(),
            value_path: std::sync::OnceLock::new(),
        }
    }

    pub async fn assert(&self) -> Result<()> {
        self.write_level(true).await
    }

    pub async fn release(&self) -> Result<()> {
        self.write_level(false).await
    }

    async fn write_level(&self, asserted: bool) -> Result<()> {
        let value_path = self.ensure_exported().await?;
        let mut level = u8::from(asserted);
        if self.config.active_low {
            level ^= 1;
        }
        std::fs::write(&value_path, format!("{level}\n"))
            .change_context(HwError::GpioWrite)
            .attach_printable_lazy(|| format!("gpio {}", self.config.number))?;
        tracing::debug!(
            gpio = self.config.number,
            asserted,
            "decouple signal updated"
        );
        if !self.config.settle.is_zero() {
            tokio::time::sleep(self.config.settle).await;
        }
        Ok(())
    }

    async fn ensure_exported(&self) -> Result<PathBuf> {
        if let Some(path) = self.value_path.get() {
            return Ok(path.clone());
        }
        let gpio_dir = self
            .sysfs_root
            .join(format!("gpio{}", self.config.number));
        if !gpio_dir.exists() {
            let export = self.sysfs_root.join("export");
            std::fs::write(&export, format!("{}\n", self.config.number)).change_context(
                HwError::GpioUnavailable {
                    number: self.config.number,
                },
            )?;
            // The kernel creates the directory asynchronously after export.
            for _ in 0..50 {
                if gpio_dir.exists() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
        if !gpio_dir.exists() {
            return Err(error_stack::report!(HwError::GpioUnavailable {
                number: self.config.number,
            }));
        }
        self.configure_direction(&gpio_dir)?;
        let value = gpio_dir.join("value");
        let _ = self.value_path.set(value.clone());
        Ok(value)
    }

    fn configure_direction(&self, gpio_dir: &Path) -> Result<()> {
        std::fs::write(gpio_dir.join("direction"), "out\n").change_context(
            HwError::GpioUnavailable {
                number: self.config.number,
            },
        )?;
        // active_low is optional on some kernels; failure to set it only
        // matters for active-low wiring.
        let active_low = gpio_dir.join("active_low");
        let wanted = if self.config.active_low { "1\n" } else { "0\n" };
        if std::fs::write(&active_low, wanted).is_err() && self.config.active_low {
            return Err(error_stack::report!(HwError::GpioUnavailable {
                number: self.config.number,
            }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "dashrt-gpio-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn assert_release_writes_value_node() {
        let root = scratch_root("basic");
        let gpio_dir = root.join("gpio17");
        std::fs::create_dir_all(&gpio_dir).unwrap();
        std::fs::write(gpio_dir.join("value"), "0\n").unwrap();

        let mut config = DecoupleGpioConfig::new(17);
        config.settle = Duration::ZERO;
        let gpio = DecoupleGpio::with_sysfs_root(config, &root);

        gpio.assert().await.unwrap();
        assert_eq!(std::fs::read_to_string(gpio_dir.join("value")).unwrap(), "1\n");
        gpio.release().await.unwrap();
        assert_eq!(std::fs::read_to_string(gpio_dir.join("value")).unwrap(), "0\n");
    }

    #[tokio::test]
    async fn active_low_inverts_levels() {
        let root = scratch_root("active-low");
        let gpio_dir = root.join("gpio9");
        std::fs::create_dir_all(&gpio_dir).unwrap();

        let mut config = DecoupleGpioConfig::new(9);
        config.active_low = true;
        config.settle = Duration::ZERO;
        let gpio = DecoupleGpio::with_sysfs_root(config, &root);

        gpio.assert().await.unwrap();
        assert_eq!(std::fs::read_to_string(gpio_dir.join("value")).unwrap(), "0\n");
    }

    #[tokio::test]
    async fn missing_gpio_is_an_error() {
        let root = scratch_root("missing");
        // No export node and no gpio directory: export itself fails.
        let mut config = DecoupleGpioConfig::new(3);
        config.settle = Duration::ZERO;
        let gpio = DecoupleGpio::with_sysfs_root(config, root.join("nonexistent"));
        assert!(gpio.assert().await.is_err());
    }
}
