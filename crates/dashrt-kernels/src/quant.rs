//! Float <-> Q15 conversion for the hardware FFT path. The overlay consumes
//! and produces 16-bit fixed point; the scale matches the device (32767 on
//! the way in, 32768 on the way out).

/// Saturating upper bound just below +1.0 so the scaled value fits in i16.
const Q15_MAX_INPUT: f32 = 0.999_969;

pub fn quantize(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, Q15_MAX_INPUT);
    (clamped * 32767.0).round() as i16
}

pub fn dequantize(value: i16) -> f32 {
    f32::from(value) / 32768.0
}

/// Quantize `samples` into `out` as native-endian Q15 words, the layout the
/// DMA staging buffer expects. `out` must be exactly twice as long as
/// `samples`.
pub fn quantize_slice(samples: &[f32], out: &mut [u8]) {
    debug_assert_eq!(samples.len() * 2, out.len());
    for (chunk, &sample) in out.chunks_exact_mut(2).zip(samples) {
        chunk.copy_from_slice(&quantize(sample).to_ne_bytes());
    }
}

/// Dequantize native-endian Q15 words from `raw` into `out`. `raw` must be
/// exactly twice as long as `out`.
pub fn dequantize_slice(raw: &[u8], out: &mut [f32]) {
    debug_assert_eq!(raw.len(), out.len() * 2);
    for (chunk, sample) in raw.chunks_exact(2).zip(out.iter_mut()) {
        *sample = dequantize(i16::from_ne_bytes([chunk[0], chunk[1]]));
    }
}
