use dashrt_core::{ZipContext, ZipMode};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

/// Run the zip kernel over `ctx`, writing the result and diagnostics back
/// into it. Returns `ctx.ok` for convenience.
///
/// Single-shot zlib: the whole input is consumed in one call and the output
/// must fit the context's output buffer, mirroring `compress2`/`uncompress`
/// semantics.
pub fn run(ctx: &mut ZipContext) -> bool {
    if ctx.input.is_empty() || ctx.output.is_empty() {
        ctx.ok = false;
        ctx.message = "zip: buffers missing".to_owned();
        return false;
    }
    let level = ctx.params.level.clamp(0, 9) as u32;
    let outcome = match ctx.params.mode {
        ZipMode::Compress => {
            let mut z = Compress::new(Compression::new(level), true);
            z.compress(&ctx.input, &mut ctx.output, FlushCompress::Finish)
                .map(|status| (status, z.total_out()))
                .map_err(|e| e.to_string())
        }
        ZipMode::Decompress => {
            let mut z = Decompress::new(true);
            z.decompress(&ctx.input, &mut ctx.output, FlushDecompress::Finish)
                .map(|status| (status, z.total_out()))
                .map_err(|e| e.to_string())
        }
    };
    match outcome {
        Ok((Status::StreamEnd, total_out)) => {
            ctx.out_actual = total_out as usize;
            ctx.ok = true;
            let verb = match ctx.params.mode {
                ZipMode::Compress => "compressed",
                ZipMode::Decompress => "decompressed",
            };
            ctx.message = format!("zip: {verb} ({} -> {})", ctx.input.len(), ctx.out_actual);
            true
        }
        Ok((status, _)) => {
            // Ran out of output space before the stream finished.
            ctx.ok = false;
            ctx.message = format!("zip: output buffer exhausted ({status:?})");
            false
        }
        Err(e) => {
            ctx.ok = false;
            ctx.message = format!("zip: zlib error {e}");
            false
        }
    }
}
