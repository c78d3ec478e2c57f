//! Hardware collaborators consumed by the DASH scheduling core.
//!
//! Nothing here knows about tasks or scheduling. The crate models the
//! platform surface the core depends on (programming bitstreams through the
//! FPGA manager, isolating a reconfigurable region behind its decouple GPIO,
//! fallible register access, contiguous DMA buffers, and the AXI DMA channel
//! pair) plus mock variants that make the core testable without hardware.

mod bitstream;
mod dma;
mod error;
mod gpio;
mod mmio;
mod udmabuf;

pub use bitstream::{BitstreamLoader, LoadRecord, MockBitstreamLoader, SysfsBitstreamLoader};
pub use dma::{AxiDmaEngine, DmaEngine, MockDmaEngine, TransferRecord};
pub use error::{HwError, Result};
pub use gpio::{DecoupleGpio, DecoupleGpioConfig};
pub use mmio::MmioHandle;
pub use udmabuf::UdmabufRegion;
