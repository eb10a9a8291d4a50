use crate::archive::index::FrameIndex;
use crate::archive::segment::Segment;

/// Intersects requested time ranges with the intervals of a [`FrameIndex`].
pub struct SegmentLocator<'a> {
    index: &'a FrameIndex,
}

impl<'a> SegmentLocator<'a> {
    pub fn new(index: &'a FrameIndex) -> Self {
        Self { index }
    }

    /// Sub-intervals of `[t_start, t_stop)` present in the archive, ascending.
    ///
    /// Gaps are left out; a request that falls entirely in a gap yields an
    /// empty list.
    pub fn resolve(&self, t_start: f64, t_stop: f64) -> Vec<Segment> {
        resolve(self.index, t_start, t_stop)
    }
}

pub fn resolve(index: &FrameIndex, t_start: f64, t_stop: f64) -> Vec<Segment> {
    let request = Segment::new(t_start, t_stop);
    if request.is_empty() {
        return Vec::new();
    }

    let segments = index.segments();
    let first = segments.partition_point(|s| s.stop <= t_start);

    segments[first..]
        .iter()
        .take_while(|s| s.start < t_stop)
        .filter_map(|s| s.intersect(&request))
        .collect()
}
