use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open time range `[start, stop)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub stop: f64,
}

impl Segment {
    pub fn new(start: f64, stop: f64) -> Self {
        Self { start, stop }
    }

    pub fn duration(&self) -> f64 {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_nan() || self.stop.is_nan() || self.stop <= self.start
    }

    pub fn intersect(&self, other: &Segment) -> Option<Segment> {
        let seg = Segment::new(self.start.max(other.start), self.stop.min(other.stop));
        (!seg.is_empty()).then_some(seg)
    }

    /// Cuts the segment into consecutive pieces of `step` seconds; the last may be shorter.
    pub fn split(&self, step: f64) -> Vec<Segment> {
        let mut pieces = Vec::new();
        if self.is_empty() || step.is_nan() || step <= 0.0 {
            return pieces;
        }
        // offsets from the origin, never accumulated
        let mut i = 0u64;
        loop {
            let start = self.start + i as f64 * step;
            if start >= self.stop {
                break;
            }
            pieces.push(Segment::new(start, (start + step).min(self.stop)));
            i += 1;
        }
        pieces
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}
