use dashrt_core::FftContext;
use num_complex::Complex64;

/// Run the reference DFT over `ctx`. Returns `ctx.ok` for convenience.
///
/// This is the correctness baseline the hardware path falls back to: an
/// O(n^2) transform over real input samples, writing the real part of each
/// bin. The inverse direction applies the usual 1/n scaling.
pub fn run(ctx: &mut FftContext) -> bool {
    let max_in = ctx.input.len();
    let max_out = ctx.output.len();
    let n = if ctx.plan.n != 0 {
        ctx.plan.n
    } else {
        max_in.min(max_out)
    };
    if n == 0 || max_in < n || max_out < n {
        ctx.ok = false;
        ctx.message = "fft: buffer sizes insufficient".to_owned();
        return false;
    }

    let sign = if ctx.plan.inverse { 1.0 } else { -1.0 };
    let step = sign * std::f64::consts::TAU / n as f64;
    for k in 0..n {
        let mut sum = Complex64::new(0.0, 0.0);
        for (j, &sample) in ctx.input[..n].iter().enumerate() {
            let angle = step * (k as f64) * (j as f64);
            sum += Complex64::new(sample as f64, 0.0) * Complex64::from_polar(1.0, angle);
        }
        if ctx.plan.inverse {
            sum /= n as f64;
        }
        ctx.output[k] = sum.re as f32;
    }
    ctx.ok = true;
    ctx.message = format!("fft: computed n={n}");
    true
}
