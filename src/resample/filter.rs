//! Chebyshev type I low-pass design and second-order-section filtering.
//!
//! Design follows the usual analog prototype → frequency scaling → bilinear
//! transform chain, producing cascaded biquads in transposed direct form II.
//! Normalised frequencies are relative to Nyquist (1.0 == fs / 2).

use crate::core::error::{FrameError, Result};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Cascaded second-order sections, each `[b0, b1, b2, 1, a1, a2]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SosFilter {
    sections: Vec<[f64; 6]>,
}

impl SosFilter {
    pub fn sections(&self) -> &[[f64; 6]] {
        &self.sections
    }

    /// Gain at 0 Hz.
    pub fn dc_gain(&self) -> f64 {
        self.sections
            .iter()
            .map(|s| (s[0] + s[1] + s[2]) / (s[3] + s[4] + s[5]))
            .product()
    }

    /// Causal single pass from zero initial state.
    pub fn filter(&self, x: &[f64]) -> Vec<f64> {
        let zi = vec![[0.0; 2]; self.sections.len()];
        self.filter_with_state(x, zi)
    }

    fn filter_with_state(&self, x: &[f64], mut zi: Vec<[f64; 2]>) -> Vec<f64> {
        let mut y = x.to_vec();
        for (s, z) in self.sections.iter().zip(zi.iter_mut()) {
            for v in y.iter_mut() {
                let input = *v;
                let out = s[0] * input + z[0];
                z[0] = s[1] * input - s[4] * out + z[1];
                z[1] = s[2] * input - s[5] * out;
                *v = out;
            }
        }
        y
    }

    /// Initial conditions matching the steady state of a unit step.
    fn step_state(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|s| {
                let gain = (s[0] + s[1] + s[2]) / (s[3] + s[4] + s[5]);
                let z1 = s[2] - s[5] * gain;
                let z0 = s[1] - s[4] * gain + z1;
                let state = [scale * z0, scale * z1];
                scale *= gain;
                state
            })
            .collect()
    }

    /// Zero-phase forward-backward pass with odd-extension padding at both edges.
    pub fn filtfilt(&self, x: &[f64]) -> Vec<f64> {
        if x.is_empty() {
            return Vec::new();
        }

        let trailing_zeros = self
            .sections
            .iter()
            .filter(|s| s[2] == 0.0)
            .count()
            .min(self.sections.iter().filter(|s| s[5] == 0.0).count());
        let padlen = (3 * (2 * self.sections.len() + 1 - trailing_zeros)).min(x.len() - 1);

        let ext = odd_extend(x, padlen);
        let zi = self.step_state();

        let scaled = |x0: f64| zi.iter().map(|z| [z[0] * x0, z[1] * x0]).collect::<Vec<_>>();

        let mut y = self.filter_with_state(&ext, scaled(ext[0]));
        y.reverse();
        let mut y = self.filter_with_state(&y, scaled(y[0]));
        y.reverse();

        y[padlen..y.len() - padlen].to_vec()
    }
}

fn odd_extend(x: &[f64], padlen: usize) -> Vec<f64> {
    let n = x.len();
    let (first, last) = (x[0], x[n - 1]);
    let mut ext = Vec::with_capacity(n + 2 * padlen);
    ext.extend((1..=padlen).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=padlen).map(|i| 2.0 * last - x[n - 1 - i]));
    ext
}

/// Designs an `order`-th order Chebyshev type I low-pass filter.
///
/// `ripple_db` is the peak-to-peak passband ripple, `cutoff` the normalised
/// edge of the passband in `(0, 1)`.
pub fn cheby1_lowpass(order: usize, ripple_db: f64, cutoff: f64) -> Result<SosFilter> {
    if order == 0 {
        return Err(FrameError::InvalidConfig("filter order must be positive".to_string()));
    }
    if ripple_db.is_nan() || ripple_db <= 0.0 {
        return Err(FrameError::InvalidConfig(format!(
            "passband ripple must be positive, got {}",
            ripple_db
        )));
    }
    if cutoff.is_nan() || cutoff <= 0.0 || cutoff >= 1.0 {
        return Err(FrameError::InvalidConfig(format!(
            "normalised cutoff must lie in (0, 1), got {}",
            cutoff
        )));
    }
    Ok(design_cheby1(order, ripple_db, cutoff))
}

pub(crate) fn design_cheby1(order: usize, ripple_db: f64, cutoff: f64) -> SosFilter {
    let n = order as f64;

    // analog prototype, cutoff 1 rad/s
    let eps = (10f64.powf(0.1 * ripple_db) - 1.0).sqrt();
    let mu = (1.0 / eps).asinh() / n;
    let poles: Vec<Complex64> = (0..order)
        .map(|i| {
            let m = -(n - 1.0) + 2.0 * i as f64;
            -Complex64::new(mu, PI * m / (2.0 * n)).sinh()
        })
        .collect();
    let mut gain = poles.iter().map(|p| -*p).product::<Complex64>().re;
    if order % 2 == 0 {
        gain /= (1.0 + eps * eps).sqrt();
    }

    // pre-warped frequency scaling, sample rate 2 so Nyquist is 1
    let fs2 = 4.0;
    let warped = fs2 * (PI * cutoff / 2.0).tan();
    let poles: Vec<Complex64> = poles.iter().map(|p| *p * warped).collect();
    gain *= warped.powi(order as i32);

    // bilinear transform; all zeros land on z = -1
    let denom: Complex64 = poles.iter().map(|p| fs2 - *p).product();
    gain *= (Complex64::new(1.0, 0.0) / denom).re;
    let digital: Vec<Complex64> = poles.iter().map(|p| (fs2 + *p) / (fs2 - *p)).collect();

    // one pole of each conjugate pair, plus the real pole of odd orders
    let mut upper: Vec<Complex64> = digital.iter().copied().filter(|p| p.im > 1e-12).collect();
    let real: Option<Complex64> = digital.iter().copied().find(|p| p.im.abs() <= 1e-12);
    // sections nearest the unit circle run last
    upper.sort_by(|a, b| a.norm().total_cmp(&b.norm()));

    let mut sections = Vec::with_capacity(order.div_ceil(2));
    if let Some(p) = real {
        sections.push([1.0, 1.0, 0.0, 1.0, -p.re, 0.0]);
    }
    for p in upper {
        sections.push([1.0, 2.0, 1.0, 1.0, -2.0 * p.re, p.norm_sqr()]);
    }
    if let Some(first) = sections.first_mut() {
        first[0] *= gain;
        first[1] *= gain;
        first[2] *= gain;
    }

    SosFilter { sections }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// |H(e^{jw})| for normalised frequency `f` (1.0 == Nyquist)
    fn magnitude(sos: &SosFilter, f: f64) -> f64 {
        let z = Complex64::from_polar(1.0, PI * f);
        sos.sections()
            .iter()
            .map(|s| {
                let zi = z.inv();
                let num = s[0] + s[1] * zi + s[2] * zi * zi;
                let den = s[3] + s[4] * zi + s[5] * zi * zi;
                (num / den).norm()
            })
            .product()
    }

    #[test]
    fn test_order_four_has_two_sections() {
        let sos = cheby1_lowpass(4, 0.05, 0.2).unwrap();
        assert_eq!(sos.sections().len(), 2);
    }

    #[test]
    fn test_dc_gain_matches_ripple() {
        // even orders sit at the bottom of the ripple band at DC
        let sos = cheby1_lowpass(4, 0.05, 0.2).unwrap();
        let expected = 10f64.powf(-0.05 / 20.0);
        assert!((sos.dc_gain() - expected).abs() < 1e-9, "{}", sos.dc_gain());

        let odd = cheby1_lowpass(3, 0.05, 0.2).unwrap();
        assert!((odd.dc_gain() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_passband_and_stopband() {
        let sos = cheby1_lowpass(4, 0.05, 0.2).unwrap();
        let ripple_floor = 10f64.powf(-0.05 / 20.0) - 1e-6;
        for f in [0.01, 0.05, 0.1, 0.15, 0.2] {
            let m = magnitude(&sos, f);
            assert!(m >= ripple_floor && m <= 1.0 + 1e-6, "f={f}: {m}");
        }
        assert!(magnitude(&sos, 0.6) < 0.01);
        assert!(magnitude(&sos, 0.99) < 1e-4);
    }

    #[test]
    fn test_poles_stable() {
        let sos = cheby1_lowpass(4, 0.05, 0.05).unwrap();
        for s in sos.sections() {
            // |p|^2 = a2 for a conjugate pair
            assert!(s[5] < 1.0 && s[5] > 0.0);
        }
    }

    #[test]
    fn test_invalid_design() {
        assert!(cheby1_lowpass(0, 0.05, 0.2).is_err());
        assert!(cheby1_lowpass(4, 0.05, 1.0).is_err());
        assert!(cheby1_lowpass(4, -1.0, 0.2).is_err());
    }

    #[test]
    fn test_filter_settles_to_dc_gain() {
        let sos = cheby1_lowpass(4, 0.05, 0.2).unwrap();
        let y = sos.filter(&[1.0; 400]);
        assert_eq!(y.len(), 400);
        assert!((y[399] - sos.dc_gain()).abs() < 1e-6);
        assert!(y[0].abs() < 0.1);
    }

    #[test]
    fn test_filtfilt_constant_has_no_edge_transient() {
        let sos = cheby1_lowpass(4, 0.05, 0.2).unwrap();
        let y = sos.filtfilt(&[3.0; 100]);
        let expected = 3.0 * sos.dc_gain() * sos.dc_gain();
        assert_eq!(y.len(), 100);
        for v in y {
            assert!((v - expected).abs() < 1e-6, "{v}");
        }
    }

    #[test]
    fn test_filtfilt_short_inputs() {
        let sos = cheby1_lowpass(4, 0.05, 0.2).unwrap();
        assert!(sos.filtfilt(&[]).is_empty());
        assert_eq!(sos.filtfilt(&[1.0, 2.0, 3.0]).len(), 3);
    }

    #[test]
    fn test_odd_extend() {
        assert_eq!(
            odd_extend(&[1.0, 2.0, 4.0], 2),
            vec![-2.0, 0.0, 1.0, 2.0, 4.0, 6.0, 7.0]
        );
    }
}
