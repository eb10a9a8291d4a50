// Fourier-domain resampling to an exact sample count

use num_complex::Complex64;
use rustfft::FftPlanner;
use std::f64::consts::PI;

/// Periodic Hamming window value at `n` of `len`.
fn hamming(n: usize, len: usize) -> f64 {
    0.54 - 0.46 * (2.0 * PI * n as f64 / len as f64).cos()
}

/// Resamples `x` to `num` samples by truncating or zero-padding its spectrum.
///
/// The spectrum is tapered with a Hamming window centred on DC before the
/// inverse transform.
pub fn resample(x: &[f64], num: usize) -> Vec<f64> {
    let nx = x.len();
    if nx == 0 || num == 0 {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f64>::new();

    let mut spectrum: Vec<Complex64> = x.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    planner.plan_fft_forward(nx).process(&mut spectrum);

    // non-negative frequencies only; window shifted so its peak sits on bin 0
    let half = nx / 2 + 1;
    for (k, bin) in spectrum.iter_mut().take(half).enumerate() {
        *bin *= hamming((k + nx / 2) % nx, nx);
    }

    let n = num.min(nx);
    let nyquist = n / 2 + 1;
    let out_half = num / 2 + 1;
    let mut y = vec![Complex64::new(0.0, 0.0); out_half];
    y[..nyquist].copy_from_slice(&spectrum[..nyquist]);
    if n % 2 == 0 {
        // the shared Nyquist bin carries both halves
        if num < nx {
            y[n / 2] *= 2.0;
        } else if num > nx {
            y[n / 2] *= 0.5;
        }
    }

    // rebuild the Hermitian spectrum of a real signal
    let mut full = vec![Complex64::new(0.0, 0.0); num];
    full[..out_half].copy_from_slice(&y);
    full[0].im = 0.0;
    if num % 2 == 0 {
        full[num / 2].im = 0.0;
    }
    for k in 1..num.div_ceil(2) {
        full[num - k] = y[k].conj();
    }
    planner.plan_fft_inverse(num).process(&mut full);

    full.iter().map(|c| c.re / nx as f64).collect()
}
