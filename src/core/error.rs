// Error handling for the frame cache and resampling pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FrameError>;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic bytes: expected {expected:?}, got {got:?}")]
    InvalidMagic { expected: Vec<u8>, got: Vec<u8> },

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unsupported compression type: {0}")]
    UnsupportedCompression(u8),

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("Invalid UTF-8 string")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Manifest parse error at line {line}: {reason}")]
    ParseError { line: usize, reason: String },

    #[error("No archived data overlaps [{start}, {end})")]
    EmptyArchive { start: f64, end: f64 },

    #[error("Channel {channel} not found in {file}")]
    ChannelNotFound { channel: String, file: String },

    #[error("No frame file covers instant {0}")]
    NoCoverage(f64),

    #[error("Unsupported resampling method: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
}
