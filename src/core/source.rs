// Raw channel access contract and its filesystem implementation

use crate::core::error::Result;
use crate::core::format::{ChannelDescriptor, SampleBlock};
use crate::core::reader::FrameFileReader;
use std::path::{Path, PathBuf};

/// An opened archive file.
pub trait FrameHandle {
    /// Samples of `channel` in `[start, stop)`.
    fn read(&self, channel: &str, start: f64, stop: f64) -> Result<SampleBlock>;

    fn list_channels(&self, instant: f64) -> Result<Vec<ChannelDescriptor>>;
}

/// Opens archive files by the reference stored in the manifest.
pub trait FrameSource: Send + Sync {
    type Handle: FrameHandle;

    fn open(&self, file_ref: &str) -> Result<Self::Handle>;
}

impl FrameHandle for FrameFileReader {
    fn read(&self, channel: &str, start: f64, stop: f64) -> Result<SampleBlock> {
        FrameFileReader::read(self, channel, start, stop)
    }

    fn list_channels(&self, _instant: f64) -> Result<Vec<ChannelDescriptor>> {
        Ok(FrameFileReader::list_channels(self).to_vec())
    }
}

/// Frame files on local disk; relative references resolve against `root`.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Resolves references relative to the directory holding the manifest.
    pub fn for_manifest<P: AsRef<Path>>(manifest: P) -> Self {
        let root = manifest
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self { root }
    }

    pub fn resolve(&self, file_ref: &str) -> PathBuf {
        let path = Path::new(file_ref);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl FrameSource for FsSource {
    type Handle = FrameFileReader;

    fn open(&self, file_ref: &str) -> Result<FrameFileReader> {
        FrameFileReader::open(self.resolve(file_ref))
    }
}
