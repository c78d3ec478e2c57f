use std::fs::File;
use std::os::unix::fs::FileExt as _;
use std::path::Path;

use error_stack::ResultExt as _;
use memmap2::MmapRaw;

use crate::error::{HwError, Result};

/// Fallible 32-bit register access.
///
/// Bad accesses surface as errors instead of bus faults: the char-device
/// backend reports short reads/writes, and the mapped backend bounds-checks
/// every offset against the mapped span before touching memory.
pub enum MmioHandle {
    /// Register window exported by a kernel driver as a char device.
    Device { file: File, span: usize },
    /// Direct physical mapping (e.g. through `/dev/mem`).
    Mapped { map: MmapRaw, span: usize },
}

impl MmioHandle {
    /// Open a driver-provided register char device.
    pub fn open_device(path: impl AsRef<Path>, span: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .change_context(HwError::MmioAccess)
            .attach_printable_lazy(|| format!("open {}", path.display()))?;
        Ok(Self::Device { file, span })
    }

    /// Map `span` bytes of physical address space starting at `base_phys`
    /// through `/dev/mem`.
    pub fn map_physical(base_phys: u64, span: usize) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open("/dev/mem")
            .change_context(HwError::MmioAccess)
            .attach_printable("open /dev/mem")?;
        let map = memmap2::MmapOptions::new()
            .offset(base_phys)
            .len(span)
            .map_raw(&file)
            .change_context(HwError::MmioAccess)
            .attach_printable_lazy(|| format!("map phys {base_phys:#x} span {span:#x}"))?;
        Ok(Self::Mapped { map, span })
    }

    fn check_range(&self, offset: u64) -> Result<()> {
        let span = match self {
            Self::Device { span, .. } | Self::Mapped { span, .. } => *span,
        };
        if offset
            .checked_add(4)
            .map(|end| end as usize > span)
            .unwrap_or(true)
        {
            return Err(error_stack::report!(HwError::MmioOutOfRange {
                offset,
                span,
            }));
        }
        Ok(())
    }

    pub fn read32(&self, offset: u64) -> Result<u32> {
        self.check_range(offset)?;
        match self {
            Self::Device { file, .. } => {
                let mut buf = [0u8; 4];
                file.read_exact_at(&mut buf, offset)
                    .change_context(HwError::MmioAccess)
                    .attach_printable_lazy(|| format!("read32 at {offset:#x}"))?;
                Ok(u32::from_ne_bytes(buf))
            }
            Self::Mapped { map, .. } => {
                // Bounds were checked above; registers require volatile access.
                let ptr = unsafe { map.as_mut_ptr().add(offset as usize) } as *const u32;
                Ok(unsafe { ptr.read_volatile() })
            }
        }
    }

    pub fn write32(&self, offset: u64, value: u32) -> Result<()> {
        self.check_range(offset)?;
        match self {
            Self::Device { file, .. } => {
                file.write_all_at(&value.to_ne_bytes(), offset)
                    .change_context(HwError::MmioAccess)
                    .attach_printable_lazy(|| format!("write32 at {offset:#x}"))?;
                Ok(())
            }
            Self::Mapped { map, .. } => {
                let ptr = unsafe { map.as_mut_ptr().add(offset as usize) } as *mut u32;
                unsafe { ptr.write_volatile(value) };
                Ok(())
            }
        }
    }
}
