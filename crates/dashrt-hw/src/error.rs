use thiserror::Error;

#[derive(Error, Debug)]
pub enum HwError {
    #[error("bitstream load failed for '{path}'")]
    BitstreamLoad { path: String },
    #[error("decouple GPIO {number} unavailable")]
    GpioUnavailable { number: u32 },
    #[error("GPIO write failed")]
    GpioWrite,
    #[error("MMIO access out of range: offset {offset:#x}, span {span:#x}")]
    MmioOutOfRange { offset: u64, span: usize },
    #[error("MMIO access failed")]
    MmioAccess,
    #[error("udmabuf '{name}' unavailable")]
    UdmabufUnavailable { name: String },
    #[error("udmabuf '{name}' too small ({size} bytes)")]
    UdmabufTooSmall { name: String, size: usize },
    #[error("DMA engine not ready")]
    DmaNotReady,
    #[error("DMA channel error (status {status:#x})")]
    DmaChannelError { status: u32 },
    #[error("DMA transfer timed out")]
    DmaTimeout,
}

pub type Result<T, E = error_stack::Report<HwError>> = std::result::Result<T, E>;
