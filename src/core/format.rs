// Data structures for frame and chunk files

use serde::{Deserialize, Serialize};

/// A channel as it is enumerated from the archive: name plus native rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    pub sample_rate: f64,
    #[serde(default)]
    pub unit: String,
}

impl ChannelDescriptor {
    pub fn new(name: impl Into<String>, sample_rate: f64) -> Self {
        Self {
            name: name.into(),
            sample_rate,
            unit: String::new(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub version: u8,
    pub compression: u8,
    pub start: f64,
    pub duration: f64,
    /// Indexed by channel id
    pub channels: Vec<ChannelDescriptor>,
}

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub channel_id: u32,
    pub sample_count: u32,
    pub raw_length: u32,
    pub compressed_length: u32,
    pub start: f64,
}

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub channel_id: u32,
    pub offset: u64,
    pub start: f64,
    pub stop: f64,
}

/// Samples pulled for one channel over one time range.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    pub samples: Vec<f64>,
    pub channel: ChannelDescriptor,
}

impl SampleBlock {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Strings = 0,
    Matrix = 1,
}

impl DatasetKind {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(DatasetKind::Strings),
            1 => Some(DatasetKind::Matrix),
            _ => None,
        }
    }
}

/// Identity of an output chunk file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkHeader {
    pub target_rate: f64,
    pub start: f64,
    pub stop: f64,
    pub method: String,
}

/// Row-major 2D array of stacked per-channel samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl Matrix {
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Stack rows, padding short ones with NaN up to the longest row.
    pub fn stack(rows: &[Vec<f64>]) -> Self {
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            data.extend_from_slice(row);
            data.extend(std::iter::repeat(f64::NAN).take(cols - row.len()));
        }
        Self {
            rows: rows.len(),
            cols,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_pads_short_rows() {
        let m = Matrix::stack(&[vec![1.0, 2.0, 3.0], vec![4.0], vec![]]);
        assert_eq!((m.rows, m.cols), (3, 3));
        assert_eq!(m.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(m.row(1)[0], 4.0);
        assert!(m.row(1)[1..].iter().all(|v| v.is_nan()));
        assert!(m.row(2).iter().all(|v| v.is_nan()));
    }
}
