// Frame file reader - thread-safe version

use crate::core::compression::decompress;
use crate::core::constants::*;
use crate::core::error::{FrameError, Result};
use crate::core::format::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

// Sample-index slack when mapping time bounds onto a sample grid
const GRID_EPSILON: f64 = 1e-6;

pub struct FrameFileReader {
    path: PathBuf,
    file: Mutex<File>,
    header: FrameHeader,
    index: HashMap<u32, Vec<IndexEntry>>,
}

impl FrameFileReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;

        let header = Self::read_header(&mut file)?;
        let mut index = Self::read_footer_and_index(&mut file)?;
        for entries in index.values_mut() {
            entries.sort_by(|a, b| a.start.total_cmp(&b.start));
        }

        debug!(
            "Opened frame file {} ({} channels, [{}, {}))",
            path.display(),
            header.channels.len(),
            header.start,
            header.start + header.duration
        );

        Ok(Self {
            path,
            file: Mutex::new(file),
            header,
            index,
        })
    }

    fn read_header(file: &mut File) -> Result<FrameHeader> {
        let mut prefix = [0u8; FRAME_HEADER_PREFIX_SIZE];
        file.read_exact(&mut prefix)?;

        check_magic(&prefix[0..4], FRAME_MAGIC)?;

        let version = prefix[4];
        if version != FORMAT_VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }
        let compression = prefix[5];
        let start = le_f64(&prefix, 6);
        let duration = le_f64(&prefix, 14);
        let channel_count = u16::from_le_bytes([prefix[22], prefix[23]]);

        let mut channels = Vec::with_capacity(channel_count as usize);
        for expected_id in 0..channel_count as u32 {
            let channel_id = read_u32(file)?;
            if channel_id != expected_id {
                return Err(FrameError::CorruptedData(format!(
                    "Channel table out of order: expected id {}, got {}",
                    expected_id, channel_id
                )));
            }
            let name = read_string(file)?;
            let unit = read_string(file)?;
            let sample_rate = read_f64(file)?;
            channels.push(ChannelDescriptor {
                name,
                sample_rate,
                unit,
            });
        }

        Ok(FrameHeader {
            version,
            compression,
            start,
            duration,
            channels,
        })
    }

    fn read_footer_and_index(file: &mut File) -> Result<HashMap<u32, Vec<IndexEntry>>> {
        let index_offset = seek_index(file)?;
        file.seek(SeekFrom::Start(index_offset))?;

        let mut index_magic = [0u8; 4];
        file.read_exact(&mut index_magic)?;
        check_magic(&index_magic, INDEX_MAGIC)?;

        let entry_count = read_u32(file)?;

        let mut index: HashMap<u32, Vec<IndexEntry>> = HashMap::new();
        for _ in 0..entry_count {
            let mut entry_buf = [0u8; INDEX_ENTRY_SIZE];
            file.read_exact(&mut entry_buf)?;

            let channel_id = le_u32(&entry_buf, 0);
            index.entry(channel_id).or_default().push(IndexEntry {
                channel_id,
                offset: le_u64(&entry_buf, 4),
                start: le_f64(&entry_buf, 12),
                stop: le_f64(&entry_buf, 20),
            });
        }

        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn start(&self) -> f64 {
        self.header.start
    }

    pub fn duration(&self) -> f64 {
        self.header.duration
    }

    pub fn list_channels(&self) -> &[ChannelDescriptor] {
        &self.header.channels
    }

    pub fn channel_id_by_name(&self, name: &str) -> Option<u32> {
        self.header
            .channels
            .iter()
            .position(|c| c.name == name)
            .map(|id| id as u32)
    }

    /// Samples of `channel` whose timestamps fall in `[start, stop)`.
    pub fn read(&self, channel: &str, start: f64, stop: f64) -> Result<SampleBlock> {
        let channel_id =
            self.channel_id_by_name(channel)
                .ok_or_else(|| FrameError::ChannelNotFound {
                    channel: channel.to_string(),
                    file: self.path.display().to_string(),
                })?;
        let descriptor = self.header.channels[channel_id as usize].clone();
        let rate = descriptor.sample_rate;

        let compression = CompressionType::from_u8(self.header.compression)
            .ok_or(FrameError::UnsupportedCompression(self.header.compression))?;

        let mut samples = Vec::new();
        let entries = self.index.get(&channel_id).map(Vec::as_slice).unwrap_or(&[]);

        for entry in entries {
            // Skip blocks outside the requested range
            if entry.stop <= start || entry.start >= stop {
                continue;
            }

            let block = self.read_block_at(entry.offset, compression)?;
            let first = sample_offset(start - entry.start, rate).min(block.len());
            let end = sample_offset(stop - entry.start, rate).min(block.len());
            if first < end {
                samples.extend_from_slice(&block[first..end]);
            }
        }

        Ok(SampleBlock {
            samples,
            channel: descriptor,
        })
    }

    fn read_block_at(&self, offset: u64, compression: CompressionType) -> Result<Vec<f64>> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| FrameError::CorruptedData("Frame file lock poisoned".to_string()))?;

        file.seek(SeekFrom::Start(offset))?;

        let mut block_magic = [0u8; 4];
        file.read_exact(&mut block_magic)?;
        if &block_magic != BLOCK_MAGIC {
            return Err(FrameError::CorruptedData("Invalid block magic".to_string()));
        }

        let mut header_buf = [0u8; BLOCK_HEADER_SIZE];
        file.read_exact(&mut header_buf)?;

        let header = BlockHeader {
            channel_id: le_u32(&header_buf, 0),
            sample_count: le_u32(&header_buf, 4),
            raw_length: le_u32(&header_buf, 8),
            compressed_length: le_u32(&header_buf, 12),
            start: le_f64(&header_buf, 16),
        };

        let mut compressed_data = vec![0u8; header.compressed_length as usize];
        file.read_exact(&mut compressed_data)?;
        drop(file);

        let raw_data = decompress(&compressed_data, compression)?;

        let expected = header.sample_count as usize * SAMPLE_SIZE;
        if raw_data.len() != header.raw_length as usize || raw_data.len() != expected {
            return Err(FrameError::CorruptedData(format!(
                "Block for channel {}: expected {} bytes, got {}",
                header.channel_id,
                expected,
                raw_data.len()
            )));
        }

        Ok(decode_samples(&raw_data))
    }
}

fn sample_offset(seconds: f64, rate: f64) -> usize {
    (seconds * rate - GRID_EPSILON).ceil().max(0.0) as usize
}

pub(crate) fn decode_samples(raw: &[u8]) -> Vec<f64> {
    raw.chunks_exact(SAMPLE_SIZE)
        .map(|b| le_f64(b, 0))
        .collect()
}

pub(crate) fn check_magic(got: &[u8], expected: &[u8; 4]) -> Result<()> {
    if got != expected {
        return Err(FrameError::InvalidMagic {
            expected: expected.to_vec(),
            got: got.to_vec(),
        });
    }
    Ok(())
}

/// Validates the footer and returns the index offset it points to.
pub(crate) fn seek_index(file: &mut File) -> Result<u64> {
    file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;

    let mut footer = [0u8; FOOTER_SIZE];
    file.read_exact(&mut footer)?;
    check_magic(&footer[0..4], FOOTER_MAGIC)?;

    Ok(le_u64(&footer, 4))
}

pub(crate) fn le_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(b)
}

pub(crate) fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(b)
}

pub(crate) fn le_f64(buf: &[u8], at: usize) -> f64 {
    f64::from_bits(le_u64(buf, at))
}

pub(crate) fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_f64<R: Read>(r: &mut R) -> Result<f64> {
    Ok(f64::from_bits(read_u64(r)?))
}

pub(crate) fn read_string<R: Read>(r: &mut R) -> Result<String> {
    let mut len_buf = [0u8; 2];
    r.read_exact(&mut len_buf)?;
    let len = u16::from_le_bytes(len_buf) as usize;

    let mut str_buf = vec![0u8; len];
    r.read_exact(&mut str_buf)?;

    String::from_utf8(str_buf).map_err(|e| e.into())
}
