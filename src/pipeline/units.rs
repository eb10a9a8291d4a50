// Work unit planning

use crate::archive::index::FrameIndex;
use crate::archive::locator::resolve;
use crate::archive::segment::Segment;
use tracing::debug;

/// Splits the index window into independent work units.
///
/// With `unit_duration` the window is cut into fixed slices (the last one may
/// be shorter); otherwise each indexed file interval, clipped to the window,
/// becomes one unit. Units without any archived data are dropped.
pub fn plan_units(index: &FrameIndex, unit_duration: Option<f64>) -> Vec<Segment> {
    let window = index.window();
    let candidates: Vec<Segment> = match unit_duration {
        Some(duration) => window.split(duration),
        None => index
            .segments()
            .iter()
            .filter_map(|s| s.intersect(&window))
            .collect(),
    };

    candidates
        .into_iter()
        .filter(|unit| {
            let covered = !resolve(index, unit.start, unit.stop).is_empty();
            if !covered {
                debug!("Skipping unit {}: no archived data", unit);
            }
            covered
        })
        .collect()
}
