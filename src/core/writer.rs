// Frame file writer

use crate::core::compression::compress;
use crate::core::constants::*;
use crate::core::error::{FrameError, Result};
use crate::core::format::{ChannelDescriptor, IndexEntry};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes one frame file: declare channels, append sample blocks, then `finish`.
pub struct FrameFileWriter {
    path: PathBuf,
    out: BufWriter<File>,
    offset: u64,
    compression: CompressionType,
    start: f64,
    duration: f64,
    channels: Vec<ChannelDescriptor>,
    header_written: bool,
    index: Vec<IndexEntry>,
}

impl FrameFileWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        start: f64,
        duration: f64,
        compression: CompressionType,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let out = BufWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            out,
            offset: 0,
            compression,
            start,
            duration,
            channels: Vec::new(),
            header_written: false,
            index: Vec::new(),
        })
    }

    /// Declares a channel and returns its id.
    pub fn add_channel(&mut self, name: &str, unit: &str, sample_rate: f64) -> Result<u32> {
        if self.header_written {
            return Err(FrameError::InvalidConfig(
                "channels must be declared before writing blocks".to_string(),
            ));
        }
        if sample_rate.is_nan() || sample_rate <= 0.0 {
            return Err(FrameError::InvalidConfig(format!(
                "channel {} has non-positive sample rate {}",
                name, sample_rate
            )));
        }
        if self.channels.len() >= u16::MAX as usize {
            return Err(FrameError::InvalidConfig("too many channels".to_string()));
        }
        self.channels
            .push(ChannelDescriptor::new(name, sample_rate).with_unit(unit));
        Ok((self.channels.len() - 1) as u32)
    }

    fn write_header(&mut self) -> Result<()> {
        let mut buf = Vec::with_capacity(FRAME_HEADER_PREFIX_SIZE);
        buf.extend_from_slice(FRAME_MAGIC);
        buf.push(FORMAT_VERSION);
        buf.push(self.compression as u8);
        buf.extend_from_slice(&self.start.to_le_bytes());
        buf.extend_from_slice(&self.duration.to_le_bytes());
        buf.extend_from_slice(&(self.channels.len() as u16).to_le_bytes());

        for (id, channel) in self.channels.iter().enumerate() {
            buf.extend_from_slice(&(id as u32).to_le_bytes());
            put_string(&mut buf, &channel.name)?;
            put_string(&mut buf, &channel.unit)?;
            buf.extend_from_slice(&channel.sample_rate.to_le_bytes());
        }

        self.emit(&buf)?;
        self.header_written = true;
        Ok(())
    }

    /// Appends a contiguous block of samples starting at `start`.
    pub fn write_block(&mut self, channel_id: u32, start: f64, samples: &[f64]) -> Result<()> {
        let rate = self
            .channels
            .get(channel_id as usize)
            .map(|c| c.sample_rate)
            .ok_or_else(|| FrameError::InvalidConfig(format!("unknown channel id {}", channel_id)))?;
        if !self.header_written {
            self.write_header()?;
        }

        let raw: Vec<u8> = samples.iter().flat_map(|v| v.to_le_bytes()).collect();
        let packed = compress(&raw, self.compression)?;

        let mut buf = Vec::with_capacity(4 + BLOCK_HEADER_SIZE + packed.len());
        buf.extend_from_slice(BLOCK_MAGIC);
        buf.extend_from_slice(&channel_id.to_le_bytes());
        buf.extend_from_slice(&(samples.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(packed.len() as u32).to_le_bytes());
        buf.extend_from_slice(&start.to_le_bytes());
        buf.extend_from_slice(&packed);

        self.index.push(IndexEntry {
            channel_id,
            offset: self.offset,
            start,
            stop: start + samples.len() as f64 / rate,
        });
        self.emit(&buf)
    }

    /// Writes the index and footer and flushes the file.
    pub fn finish(mut self) -> Result<PathBuf> {
        if !self.header_written {
            self.write_header()?;
        }

        let index_offset = self.offset;
        let mut buf = Vec::with_capacity(8 + self.index.len() * INDEX_ENTRY_SIZE + FOOTER_SIZE);
        buf.extend_from_slice(INDEX_MAGIC);
        buf.extend_from_slice(&(self.index.len() as u32).to_le_bytes());
        for entry in &self.index {
            buf.extend_from_slice(&entry.channel_id.to_le_bytes());
            buf.extend_from_slice(&entry.offset.to_le_bytes());
            buf.extend_from_slice(&entry.start.to_le_bytes());
            buf.extend_from_slice(&entry.stop.to_le_bytes());
        }
        buf.extend_from_slice(FOOTER_MAGIC);
        buf.extend_from_slice(&index_offset.to_le_bytes());
        self.emit(&buf)?;
        self.out.flush()?;

        debug!(
            "Wrote frame file {} ({} blocks)",
            self.path.display(),
            self.index.len()
        );
        Ok(self.path)
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }
}

pub(crate) fn put_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| FrameError::InvalidConfig(format!("string too long: {} bytes", s.len())))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}
