// Per-channel reduction methods

use crate::core::error::{FrameError, Result};
use crate::resample::cache::FilterCache;
use crate::resample::fourier::resample;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReductionMethod {
    /// NaN-aware group mean
    Mean,
    /// Causal low-pass then decimate
    Filt,
    /// Zero-phase low-pass then decimate
    FiltFilt,
}

impl ReductionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReductionMethod::Mean => "mean",
            ReductionMethod::Filt => "filt",
            ReductionMethod::FiltFilt => "filtfilt",
        }
    }
}

impl FromStr for ReductionMethod {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(ReductionMethod::Mean),
            "filt" => Ok(ReductionMethod::Filt),
            "filtfilt" => Ok(ReductionMethod::FiltFilt),
            other => Err(FrameError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for ReductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reduces raw channel blocks to the target rate with one method.
#[derive(Debug, Clone)]
pub struct Reducer {
    method: ReductionMethod,
    target_rate: f64,
    cache: Arc<FilterCache>,
}

impl Reducer {
    pub fn new(method: ReductionMethod, target_rate: f64, cache: Arc<FilterCache>) -> Self {
        Self {
            method,
            target_rate,
            cache,
        }
    }

    pub fn method(&self) -> ReductionMethod {
        self.method
    }

    pub fn cache(&self) -> &FilterCache {
        &self.cache
    }

    /// Reduces `samples` recorded at `native_rate` covering `window` seconds.
    pub fn reduce(&self, samples: &[f64], native_rate: f64, window: f64) -> Result<Vec<f64>> {
        let n_target = target_count(self.target_rate, window);
        match self.method {
            ReductionMethod::Mean => Ok(mean(samples, n_target)),
            ReductionMethod::Filt => self.decimate(samples, native_rate, n_target, false),
            ReductionMethod::FiltFilt => self.decimate(samples, native_rate, n_target, true),
        }
    }

    fn decimate(
        &self,
        samples: &[f64],
        native_rate: f64,
        n_target: usize,
        zero_phase: bool,
    ) -> Result<Vec<f64>> {
        let ratio = native_rate / self.target_rate;

        if is_close(ratio, 1.0) {
            return Ok(samples.to_vec());
        }

        if ratio.fract() == 0.0 && ratio >= 1.0 && ratio <= u32::MAX as f64 {
            let step = ratio as u32;
            let sos = self.cache.get_or_create(step)?;
            let filtered = if zero_phase {
                sos.filtfilt(samples)
            } else {
                sos.filter(samples)
            };
            return Ok(filtered.into_iter().step_by(step as usize).collect());
        }

        Ok(resample(samples, n_target))
    }
}

/// Samples a window of `window` seconds holds at `rate`.
pub fn target_count(rate: f64, window: f64) -> usize {
    (rate * window).round().max(0.0) as usize
}

/// Pads with NaN to a multiple of `n_target`, then averages `n_target` equal groups ignoring NaN.
pub fn mean(samples: &[f64], n_target: usize) -> Vec<f64> {
    if samples.is_empty() || n_target == 0 {
        return Vec::new();
    }

    let group = samples.len().div_ceil(n_target);
    (0..n_target)
        .map(|g| {
            let start = (g * group).min(samples.len());
            let end = ((g + 1) * group).min(samples.len());
            nan_mean(&samples[start..end])
        })
        .collect()
}

fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reducer(method: ReductionMethod, target: f64) -> Reducer {
        Reducer::new(method, target, Arc::new(FilterCache::new()))
    }

    #[test]
    fn test_method_names() {
        for m in [
            ReductionMethod::Mean,
            ReductionMethod::Filt,
            ReductionMethod::FiltFilt,
        ] {
            assert_eq!(m.as_str().parse::<ReductionMethod>().unwrap(), m);
        }
        assert!(matches!(
            "median".parse::<ReductionMethod>(),
            Err(FrameError::UnsupportedMethod(name)) if name == "median"
        ));
    }

    #[test]
    fn test_mean_divisible_input() {
        let x: Vec<f64> = (0..2000).map(|i| i as f64).collect();
        let y = reducer(ReductionMethod::Mean, 50.0).reduce(&x, 200.0, 10.0).unwrap();
        assert_eq!(y.len(), 500);
        assert_eq!(y[0], 1.5);
        assert_eq!(y[499], 1997.5);
    }

    #[test]
    fn test_mean_ragged_input_ignores_padding() {
        // 7 samples into 3 groups of 3: the last group holds one real sample
        let y = mean(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], 3);
        assert_eq!(y, vec![2.0, 5.0, 7.0]);
    }

    #[test]
    fn test_mean_short_input_leaves_nan_groups() {
        let y = mean(&[4.0, 8.0], 4);
        assert_eq!(y.len(), 4);
        assert_eq!(&y[..2], &[4.0, 8.0]);
        assert!(y[2].is_nan() && y[3].is_nan());
    }

    #[test]
    fn test_mean_skips_nan_samples() {
        assert_eq!(mean(&[1.0, f64::NAN, 3.0, 5.0], 2), vec![1.0, 4.0]);
    }

    #[test]
    fn test_unit_ratio_is_identity() {
        let x = vec![1.0, -2.0, 3.5, 0.25];
        for method in [ReductionMethod::Filt, ReductionMethod::FiltFilt] {
            let r = reducer(method, 128.0);
            assert_eq!(r.reduce(&x, 128.0, 1.0).unwrap(), x);
            assert!(r.cache().is_empty());
        }
    }

    #[test]
    fn test_integer_ratio_decimates_with_one_filter() {
        let r = reducer(ReductionMethod::Filt, 50.0);
        let x: Vec<f64> = (0..2000).map(|i| (i as f64 * 0.01).sin()).collect();
        for _channel in 0..3 {
            assert_eq!(r.reduce(&x, 200.0, 10.0).unwrap().len(), 500);
        }
        assert_eq!(r.cache().designs(), 1);
    }

    #[test]
    fn test_filtfilt_keeps_dc_level() {
        let r = reducer(ReductionMethod::FiltFilt, 25.0);
        let y = r.reduce(&[2.0; 1000], 100.0, 10.0).unwrap();
        assert_eq!(y.len(), 250);
        let dc = r.cache().get_or_create(4).unwrap().dc_gain();
        for v in y {
            assert!((v - 2.0 * dc * dc).abs() < 1e-6);
        }
    }

    #[test]
    fn test_non_integer_ratio_uses_fourier_path() {
        let r = reducer(ReductionMethod::Filt, 30.0);
        let x = vec![1.0; 1000];
        let y = r.reduce(&x, 100.0, 10.0).unwrap();
        assert_eq!(y.len(), 300);
        assert!(r.cache().is_empty());
    }
}
