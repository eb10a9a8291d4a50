// Memoised anti-aliasing filters keyed by integer decimation ratio

use crate::core::error::{FrameError, Result};
use crate::resample::filter::{design_cheby1, SosFilter};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::debug;

pub const FILTER_ORDER: usize = 4;
pub const PASSBAND_RIPPLE_DB: f64 = 0.05;
/// Passband edge as a fraction of the decimated Nyquist frequency.
pub const CUTOFF_FACTOR: f64 = 0.8;

type Slot = Arc<OnceLock<Arc<SosFilter>>>;

/// Designs each ratio's filter at most once; entries live as long as the cache.
///
/// Safe to share across threads: concurrent requests for the same ratio wait
/// on one designer instead of racing.
#[derive(Debug, Default)]
pub struct FilterCache {
    slots: Mutex<HashMap<u32, Slot>>,
    designs: AtomicUsize,
}

impl FilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, ratio: u32) -> Result<Arc<SosFilter>> {
        if ratio == 0 {
            return Err(FrameError::InvalidConfig(
                "decimation ratio must be at least 1".to_string(),
            ));
        }

        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(ratio).or_default())
        };

        let filter = slot.get_or_init(|| {
            self.designs.fetch_add(1, Ordering::Relaxed);
            debug!("Designing low-pass filter for decimation ratio {}", ratio);
            Arc::new(design_cheby1(
                FILTER_ORDER,
                PASSBAND_RIPPLE_DB,
                CUTOFF_FACTOR / ratio as f64,
            ))
        });
        Ok(Arc::clone(filter))
    }

    /// Number of filters designed so far.
    pub fn designs(&self) -> usize {
        self.designs.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
