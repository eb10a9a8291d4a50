// Resampling run configuration

use crate::core::constants::CompressionType;
use crate::core::error::{FrameError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_window_duration() -> f64 {
    10.0
}

fn default_min_native_rate() -> f64 {
    50.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("ds_data")
}

fn default_compression() -> String {
    "zstd".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResamplerConfig {
    /// Output sample rate in Hz
    pub target_rate: f64,
    /// `mean`, `filt` or `filtfilt`; anything else yields empty output
    pub method: String,
    /// Length of one stacked dataset inside a chunk, seconds
    #[serde(default = "default_window_duration")]
    pub window_duration: f64,
    /// Work unit length; one unit per archived file when absent
    #[serde(default)]
    pub unit_duration: Option<f64>,
    /// Pool size; available parallelism minus one when absent
    #[serde(default)]
    pub workers: Option<usize>,
    /// Channels slower than this are never reduced
    #[serde(default = "default_min_native_rate")]
    pub min_native_rate: f64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_compression")]
    pub compression: String,
    /// One filter cache for all workers instead of one per work unit
    #[serde(default)]
    pub share_filter_cache: bool,
}

impl ResamplerConfig {
    pub fn new(target_rate: f64, method: &str) -> Self {
        Self {
            target_rate,
            method: method.to_string(),
            window_duration: default_window_duration(),
            unit_duration: None,
            workers: None,
            min_native_rate: default_min_native_rate(),
            output_dir: default_output_dir(),
            compression: default_compression(),
            share_filter_cache: false,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data).map_err(|e| {
            FrameError::InvalidConfig(format!("{}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |value: f64, what: &str| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(FrameError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    what, value
                )))
            }
        };

        positive(self.target_rate, "target_rate")?;
        positive(self.window_duration, "window_duration")?;
        if let Some(unit) = self.unit_duration {
            positive(unit, "unit_duration")?;
        }
        if self.min_native_rate.is_nan() || self.min_native_rate < 0.0 {
            return Err(FrameError::InvalidConfig(format!(
                "min_native_rate must not be negative, got {}",
                self.min_native_rate
            )));
        }
        if self.workers == Some(0) {
            return Err(FrameError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        self.compression_type()?;
        Ok(())
    }

    pub fn compression_type(&self) -> Result<CompressionType> {
        CompressionType::from_name(&self.compression).ok_or_else(|| {
            FrameError::InvalidConfig(format!("unknown compression {:?}", self.compression))
        })
    }

    /// Pool size for `units` work units.
    pub fn worker_count(&self, units: usize) -> usize {
        let requested = self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2)
                .saturating_sub(1)
        });
        requested.min(units).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: ResamplerConfig =
            serde_json::from_str(r#"{"target_rate": 50, "method": "filt"}"#).unwrap();
        assert_eq!(config.window_duration, 10.0);
        assert_eq!(config.min_native_rate, 50.0);
        assert_eq!(config.unit_duration, None);
        assert_eq!(config.compression_type().unwrap(), CompressionType::Zstd);
        assert!(!config.share_filter_cache);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ResamplerConfig::new(0.0, "mean");
        assert!(config.validate().is_err());

        config.target_rate = 10.0;
        config.workers = Some(0);
        assert!(config.validate().is_err());

        config.workers = Some(2);
        config.unit_duration = Some(-5.0);
        assert!(config.validate().is_err());

        config.unit_duration = None;
        config.compression = "brotli".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_method_passes_validation() {
        // reported at run time, not here
        assert!(ResamplerConfig::new(10.0, "median").validate().is_ok());
    }

    #[test]
    fn test_worker_count_bounded_by_units() {
        let mut config = ResamplerConfig::new(10.0, "mean");
        config.workers = Some(8);
        assert_eq!(config.worker_count(3), 3);
        assert_eq!(config.worker_count(20), 8);
        assert_eq!(config.worker_count(0), 1);
        config.workers = None;
        assert_eq!(config.worker_count(1), 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resampler.json");
        std::fs::write(
            &path,
            r#"{"target_rate": 25.0, "method": "mean", "unit_duration": 100, "workers": 2}"#,
        )
        .unwrap();
        let config = ResamplerConfig::load(&path).unwrap();
        assert_eq!(config.unit_duration, Some(100.0));
        assert_eq!(config.workers, Some(2));

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ResamplerConfig::load(&path),
            Err(FrameError::InvalidConfig(_))
        ));
    }
}
