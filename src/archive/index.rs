// In-memory index of the frame files covering one archive window

use crate::archive::manifest::{Manifest, ManifestRecord};
use crate::archive::segment::Segment;
use crate::core::error::{FrameError, Result};
use tracing::{debug, warn};

/// Sorted, disjoint intervals of one archive window and the files backing them.
///
/// Built once; a different window needs a new instance.
#[derive(Debug, Clone)]
pub struct FrameIndex {
    window: Segment,
    segments: Vec<Segment>,
    file_refs: Vec<String>,
}

impl FrameIndex {
    /// Keeps every record overlapping `[window_start, window_end)`, in full.
    pub fn build(manifest: &Manifest, window_start: f64, window_end: f64) -> Result<Self> {
        let window = Segment::new(window_start, window_end);

        let mut kept: Vec<&ManifestRecord> = manifest
            .records()
            .iter()
            .filter(|r| r.end() > window_start && r.start < window_end)
            .collect();

        if kept.is_empty() {
            return Err(FrameError::EmptyArchive {
                start: window_start,
                end: window_end,
            });
        }

        kept.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end().total_cmp(&b.end())));

        let mut segments: Vec<Segment> = Vec::with_capacity(kept.len());
        let mut file_refs: Vec<String> = Vec::with_capacity(kept.len());

        for record in kept {
            let mut segment = Segment::new(record.start, record.end());
            if let Some(prev) = segments.last() {
                if segment.stop <= prev.stop {
                    warn!(
                        "Dropping {} {}: covered by {}",
                        record.file_ref,
                        segment,
                        file_refs.last().map(String::as_str).unwrap_or_default()
                    );
                    continue;
                }
                if segment.start < prev.stop {
                    warn!(
                        "Trimming {} {} to start at {}",
                        record.file_ref, segment, prev.stop
                    );
                    segment.start = prev.stop;
                }
            }
            segments.push(segment);
            file_refs.push(record.file_ref.clone());
        }

        debug!(
            "Indexed {} frame files for window {}",
            segments.len(),
            window
        );

        Ok(Self {
            window,
            segments,
            file_refs,
        })
    }

    pub fn window(&self) -> Segment {
        self.window
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn file_refs(&self) -> &[String] {
        &self.file_refs
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Position of the indexed interval fully containing `segment`.
    pub fn find(&self, segment: &Segment) -> Option<usize> {
        let i = self.segments.partition_point(|s| s.stop <= segment.start);
        self.segments
            .get(i)
            .filter(|s| s.start <= segment.start && segment.stop <= s.stop)
            .map(|_| i)
    }

    /// File backing the indexed interval that contains `segment`.
    pub fn lookup(&self, segment: &Segment) -> Option<&str> {
        self.find(segment).map(|i| self.file_refs[i].as_str())
    }

    /// Position of the interval covering `instant`, or else the first one after it.
    pub fn position_at_or_after(&self, instant: f64) -> Option<usize> {
        let i = self.segments.partition_point(|s| s.stop <= instant);
        (i < self.segments.len()).then_some(i)
    }
}
