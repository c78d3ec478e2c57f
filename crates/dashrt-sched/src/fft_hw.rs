use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashrt_core::SharedFftContext;
use dashrt_hw::{AxiDmaEngine, DmaEngine, MmioHandle, UdmabufRegion};
use dashrt_kernels::quant;
use error_stack::ResultExt as _;

/// Bring-up parameters for the hardware FFT path.
#[derive(Debug, Clone)]
pub struct FftHwConfig {
    /// u-dma-buf device name under `/dev` and `/sys/class/u-dma-buf`.
    pub udmabuf_name: String,
    /// Smallest usable scratch region; half is input, half is output.
    pub min_buffer_bytes: usize,
    /// Physical base of the AXI DMA register window in the static shell.
    pub dma_base: u64,
    pub dma_span: usize,
    /// Register char device to prefer over a raw `/dev/mem` mapping.
    pub dma_device: Option<String>,
}

impl Default for FftHwConfig {
    fn default() -> Self {
        Self {
            udmabuf_name: "udmabuf0".to_owned(),
            min_buffer_bytes: 1 << 19,
            // AXI DMA control registers in the top_reconfig shell.
            dma_base: 0x4041_0000,
            dma_span: 0x1_0000,
            dma_device: None,
        }
    }
}

/// Drives the hardware FFT overlay through the DMA engine.
///
/// The udmabuf region is split in half: samples are quantized to Q15 into
/// the lower half, the engine streams them through the overlay into the
/// upper half, and the result is dequantized back into the caller's output
/// buffer. The engine is single-queue hardware, so one mutex serializes all
/// callers.
pub struct FftDmaRunner {
    dma: Arc<dyn DmaEngine>,
    buffers: tokio::sync::Mutex<UdmabufRegion>,
    ready: AtomicBool,
}

impl FftDmaRunner {
    pub fn new(dma: Arc<dyn DmaEngine>, region: UdmabufRegion) -> Self {
        Self {
            dma,
            buffers: tokio::sync::Mutex::new(region),
            ready: AtomicBool::new(true),
        }
    }

    /// Bring up the hardware path from platform configuration: map the
    /// udmabuf scratch region, open the DMA register window (char device
    /// first, `/dev/mem` otherwise), and reset the engine.
    pub fn initialize(config: &FftHwConfig) -> dashrt_hw::Result<Self> {
        let region = UdmabufRegion::open(&config.udmabuf_name, config.min_buffer_bytes)?;
        tracing::debug!(
            udmabuf = %config.udmabuf_name,
            size = region.len(),
            phys = format_args!("{:#x}", region.phys()),
            "fft scratch region mapped"
        );
        let mmio = match &config.dma_device {
            Some(device) => MmioHandle::open_device(device, config.dma_span)
                .attach_printable_lazy(|| format!("dma device {device}"))?,
            None => MmioHandle::map_physical(config.dma_base, config.dma_span)?,
        };
        let dma = AxiDmaEngine::new(mmio)?;
        Ok(Self::new(Arc::new(dma), region))
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && self.dma.is_ready()
    }

    /// Run one transform. Returns `true` when the hardware produced the
    /// result (and the context carries it); `false` when the caller should
    /// fall back to the CPU kernel. The context is only written when the
    /// transfer actually ran.
    pub async fn execute(&self, ctx: &SharedFftContext) -> bool {
        if !self.is_ready() {
            return false;
        }
        let mut region = self.buffers.lock().await;
        let half = region.len() / 2;

        // Stage the input while holding the context lock, then release it
        // for the duration of the transfer.
        let (sample_count, bytes) = {
            let guard = ctx.lock().expect("fft context lock poisoned");
            let sample_count = if guard.plan.n != 0 {
                guard.plan.n
            } else {
                // Interleaved complex floats: two per sample.
                guard.input.len() / 2
            };
            if sample_count == 0 {
                return false;
            }
            let value_count = sample_count * 2;
            let bytes = value_count * std::mem::size_of::<i16>();
            if bytes > half {
                tracing::warn!(bytes, half, "fft transfer exceeds udmabuf half");
                return false;
            }
            if guard.input.len() < value_count || guard.output.len() < value_count {
                tracing::warn!(
                    sample_count,
                    input = guard.input.len(),
                    output = guard.output.len(),
                    "fft buffers too small for hardware path"
                );
                return false;
            }
            quant::quantize_slice(&guard.input[..value_count], &mut region.bytes_mut()[..bytes]);
            (sample_count, bytes)
        };

        let src = region.phys();
        let dst = region.phys() + half as u64;
        tracing::debug!(
            sample_count,
            src = format_args!("{src:#x}"),
            dst = format_args!("{dst:#x}"),
            bytes,
            "launching fft DMA roundtrip"
        );
        let transferred = self.dma.transfer(src, dst, bytes).await;

        let mut guard = ctx.lock().expect("fft context lock poisoned");
        match transferred {
            Ok(()) => {
                let value_count = sample_count * 2;
                quant::dequantize_slice(
                    &region.bytes()[half..half + bytes],
                    &mut guard.output[..value_count],
                );
                guard.ok = true;
                guard.message = format!("fft: hw n={sample_count}");
                true
            }
            Err(e) => {
                tracing::warn!(error = ?e, "fft DMA roundtrip failed, marking runner unavailable");
                self.ready.store(false, Ordering::SeqCst);
                guard.ok = false;
                guard.message = "fft: hw DMA failure".to_owned();
                false
            }
        }
    }
}
