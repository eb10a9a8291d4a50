// Per-channel sample access over resolved segments

use crate::archive::index::FrameIndex;
use crate::archive::locator::resolve;
use crate::archive::segment::Segment;
use crate::core::error::{FrameError, Result};
use crate::core::format::ChannelDescriptor;
use crate::core::source::{FrameHandle, FrameSource};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

/// Reads channel samples for segments of a [`FrameIndex`], keeping files open between reads.
pub struct ChannelReader<'a, S: FrameSource> {
    index: &'a FrameIndex,
    source: &'a S,
    handles: HashMap<usize, S::Handle>,
}

impl<'a, S: FrameSource> ChannelReader<'a, S> {
    pub fn new(index: &'a FrameIndex, source: &'a S) -> Self {
        Self {
            index,
            source,
            handles: HashMap::new(),
        }
    }

    fn handle(&mut self, position: usize) -> Result<&S::Handle> {
        match self.handles.entry(position) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(v) => {
                let file_ref = &self.index.file_refs()[position];
                debug!("Opening frame file {}", file_ref);
                Ok(v.insert(self.source.open(file_ref)?))
            }
        }
    }

    /// Concatenates `channel` over `segments` in the order given.
    ///
    /// Every segment must lie inside one indexed interval, as returned by
    /// [`resolve`].
    pub fn read(&mut self, segments: &[Segment], channel: &str) -> Result<Vec<f64>> {
        let mut samples = Vec::new();
        for segment in segments {
            let position = self.index.find(segment).ok_or_else(|| {
                FrameError::CorruptedData(format!("segment {} is not backed by a file", segment))
            })?;
            let block = self
                .handle(position)?
                .read(channel, segment.start, segment.stop)?;
            samples.extend(block.samples);
        }
        Ok(samples)
    }

    /// Resolves `[t_start, t_stop)` and reads `channel` over what exists.
    pub fn read_range(&mut self, t_start: f64, t_stop: f64, channel: &str) -> Result<Vec<f64>> {
        let segments = resolve(self.index, t_start, t_stop);
        self.read(&segments, channel)
    }

    /// Channels of the file covering `instant` (or the next file after it).
    pub fn list_channels(&mut self, instant: f64) -> Result<Vec<ChannelDescriptor>> {
        let position = self
            .index
            .position_at_or_after(instant)
            .ok_or(FrameError::NoCoverage(instant))?;
        self.handle(position)?.list_channels(instant)
    }
}

/// Opens the file covering `instant` and enumerates its channels.
pub fn list_channels<S: FrameSource>(
    index: &FrameIndex,
    source: &S,
    instant: f64,
) -> Result<Vec<ChannelDescriptor>> {
    ChannelReader::new(index, source).list_channels(instant)
}
