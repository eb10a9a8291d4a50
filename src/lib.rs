// Frame archive downsampler
// Main library entry point

pub mod archive;
pub mod core;
pub mod pipeline;
pub mod resample;

// Re-export main types
pub use crate::archive::channel::{list_channels, ChannelReader};
pub use crate::archive::index::FrameIndex;
pub use crate::archive::locator::SegmentLocator;
pub use crate::archive::manifest::{Manifest, ManifestRecord};
pub use crate::archive::segment::Segment;
pub use crate::core::error::{FrameError, Result};
pub use crate::core::format::ChannelDescriptor;
pub use crate::core::reader::FrameFileReader;
pub use crate::core::source::{FrameHandle, FrameSource, FsSource};
pub use crate::core::writer::FrameFileWriter;
pub use crate::pipeline::chunk::{ChunkReader, ChunkWriter};
pub use crate::pipeline::config::ResamplerConfig;
pub use crate::pipeline::runner::{DownsamplingPipeline, RunReport};
pub use crate::resample::cache::FilterCache;
pub use crate::resample::method::{ReductionMethod, Reducer};
