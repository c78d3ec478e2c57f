use std::fs::File;
use std::path::{Path, PathBuf};

use error_stack::ResultExt as _;
use memmap2::MmapMut;

use crate::error::{HwError, Result};

/// A physically-contiguous DMA buffer exported by the u-dma-buf driver.
///
/// Sysfs publishes the size and physical base; the device node maps the
/// memory itself into our address space.
pub struct UdmabufRegion {
    name: String,
    map: MmapMut,
    phys: u64,
}

impl UdmabufRegion {
    /// Open `/dev/<name>`, requiring at least `min_size` bytes.
    pub fn open(name: &str, min_size: usize) -> Result<Self> {
        let sysfs = PathBuf::from("/sys/class/u-dma-buf").join(name);
        let dev = PathBuf::from("/dev").join(name);
        Self::open_at(name, &sysfs, &dev, min_size)
    }

    /// Path-parameterized constructor so tests can use scratch files.
    pub fn open_at(name: &str, sysfs_dir: &Path, dev_path: &Path, min_size: usize) -> Result<Self> {
        let size = read_sysfs_u64(&sysfs_dir.join("size")).change_context(
            HwError::UdmabufUnavailable {
                name: name.to_owned(),
            },
        )? as usize;
        if size < min_size {
            return Err(error_stack::report!(HwError::UdmabufTooSmall {
                name: name.to_owned(),
                size,
            }));
        }
        let phys = read_sysfs_u64(&sysfs_dir.join("phys_addr")).change_context(
            HwError::UdmabufUnavailable {
                name: name.to_owned(),
            },
        )?;
        let file = File::options()
            .read(true)
            .write(true)
            .open(dev_path)
            .change_context(HwError::UdmabufUnavailable {
                name: name.to_owned(),
            })
            .attach_printable_lazy(|| format!("open {}", dev_path.display()))?;
        let map = unsafe { memmap2::MmapOptions::new().len(size).map_mut(&file) }
            .change_context(HwError::UdmabufUnavailable {
                name: name.to_owned(),
            })?;
        tracing::debug!(name, size, phys = format_args!("{phys:#x}"), "udmabuf mapped");
        Ok(Self {
            name: name.to_owned(),
            map,
            phys,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn phys(&self) -> u64 {
        self.phys
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

/// Parse a sysfs numeric attribute; u-dma-buf publishes `size` in decimal
/// and `phys_addr` as `0x`-prefixed hex.
fn read_sysfs_u64(path: &Path) -> Result<u64> {
    let text = std::fs::read_to_string(path)
        .change_context(HwError::MmioAccess)
        .attach_printable_lazy(|| format!("read {}", path.display()))?;
    parse_u64(text.trim()).ok_or_else(|| {
        error_stack::report!(HwError::MmioAccess)
            .attach_printable(format!("unparsable value '{}' in {}", text.trim(), path.display()))
    })
}

fn parse_u64(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}
