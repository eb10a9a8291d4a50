// Chunked output container for downsampled data

use crate::archive::segment::Segment;
use crate::core::compression::{compress, decompress};
use crate::core::constants::*;
use crate::core::error::{FrameError, Result};
use crate::core::format::{ChunkHeader, DatasetKind, Matrix};
use crate::core::reader::{
    check_magic, decode_samples, le_f64, le_u32, read_string, read_u32, read_u64, seek_index,
};
use crate::core::writer::put_string;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

pub const CHANNELS_DATASET: &str = "channels";
pub const CHUNK_EXTENSION: &str = "dsck";

/// File name derived from the chunk identity.
///
/// Bounds use the shortest exact float form, so distinct units never share a name.
pub fn chunk_file_name(header: &ChunkHeader) -> String {
    format!(
        "downsampled_f{}_gs{}_ge{}_{}.{}",
        header.target_rate,
        header.start,
        header.stop,
        header.method,
        CHUNK_EXTENSION
    )
}

/// Dataset name for one sub-window.
pub fn window_dataset_name(window: &Segment) -> String {
    format!("data_gs{}_ge{}", window.start, window.stop)
}

/// Writes one chunk file; visible under its final name only after `finish`.
pub struct ChunkWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    out: BufWriter<File>,
    offset: u64,
    compression: CompressionType,
    index: Vec<(String, u64)>,
    names: HashSet<String>,
    finished: bool,
}

impl ChunkWriter {
    pub fn create<P: AsRef<Path>>(
        dir: P,
        header: &ChunkHeader,
        compression: CompressionType,
    ) -> Result<Self> {
        let path = dir.as_ref().join(chunk_file_name(header));
        let tmp_path = path.with_extension(format!("{}.tmp", CHUNK_EXTENSION));
        let out = BufWriter::new(File::create(&tmp_path)?);

        let mut writer = Self {
            path,
            tmp_path,
            out,
            offset: 0,
            compression,
            index: Vec::new(),
            names: HashSet::new(),
            finished: false,
        };

        let mut buf = Vec::with_capacity(CHUNK_HEADER_PREFIX_SIZE + 2 + header.method.len());
        buf.extend_from_slice(CHUNK_MAGIC);
        buf.push(FORMAT_VERSION);
        buf.push(compression as u8);
        buf.extend_from_slice(&header.target_rate.to_le_bytes());
        buf.extend_from_slice(&header.start.to_le_bytes());
        buf.extend_from_slice(&header.stop.to_le_bytes());
        put_string(&mut buf, &header.method)?;
        writer.emit(&buf)?;

        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_strings(&mut self, name: &str, values: &[String]) -> Result<()> {
        let mut raw = Vec::new();
        for value in values {
            put_string(&mut raw, value)?;
        }
        self.write_dataset(name, DatasetKind::Strings, values.len(), 1, &raw)
    }

    pub fn write_matrix(&mut self, name: &str, matrix: &Matrix) -> Result<()> {
        let raw: Vec<u8> = matrix.data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write_dataset(name, DatasetKind::Matrix, matrix.rows, matrix.cols, &raw)
    }

    fn write_dataset(
        &mut self,
        name: &str,
        kind: DatasetKind,
        rows: usize,
        cols: usize,
        raw: &[u8],
    ) -> Result<()> {
        if !self.names.insert(name.to_string()) {
            return Err(FrameError::InvalidConfig(format!(
                "dataset {} written twice",
                name
            )));
        }
        let packed = compress(raw, self.compression)?;

        let mut buf = Vec::with_capacity(4 + 2 + name.len() + DATASET_HEADER_SIZE + packed.len());
        buf.extend_from_slice(DATASET_MAGIC);
        put_string(&mut buf, name)?;
        buf.push(kind as u8);
        buf.extend_from_slice(&(rows as u32).to_le_bytes());
        buf.extend_from_slice(&(cols as u32).to_le_bytes());
        buf.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(packed.len() as u32).to_le_bytes());
        buf.extend_from_slice(&packed);

        self.index.push((name.to_string(), self.offset));
        self.emit(&buf)
    }

    /// Writes index and footer, then moves the file to its final name.
    pub fn finish(mut self) -> Result<PathBuf> {
        let index_offset = self.offset;
        let mut buf = Vec::new();
        buf.extend_from_slice(INDEX_MAGIC);
        buf.extend_from_slice(&(self.index.len() as u32).to_le_bytes());
        for (name, offset) in &self.index {
            put_string(&mut buf, name)?;
            buf.extend_from_slice(&offset.to_le_bytes());
        }
        buf.extend_from_slice(FOOTER_MAGIC);
        buf.extend_from_slice(&index_offset.to_le_bytes());
        self.emit(&buf)?;

        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        std::fs::rename(&self.tmp_path, &self.path)?;
        self.finished = true;

        debug!(
            "Wrote chunk {} ({} datasets)",
            self.path.display(),
            self.index.len()
        );
        Ok(self.path.clone())
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }
}

// An abandoned writer (error, panic or plain drop) leaves no temp file behind.
impl Drop for ChunkWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.tmp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", self.tmp_path.display(), e);
            }
        }
    }
}

/// Random access to the datasets of a finished chunk file.
pub struct ChunkReader {
    file: Mutex<File>,
    header: ChunkHeader,
    compression: CompressionType,
    index: Vec<(String, u64)>,
}

impl ChunkReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;

        let mut prefix = [0u8; CHUNK_HEADER_PREFIX_SIZE];
        file.read_exact(&mut prefix)?;
        check_magic(&prefix[0..4], CHUNK_MAGIC)?;
        if prefix[4] != FORMAT_VERSION {
            return Err(FrameError::UnsupportedVersion(prefix[4]));
        }
        let compression =
            CompressionType::from_u8(prefix[5]).ok_or(FrameError::UnsupportedCompression(prefix[5]))?;
        let header = ChunkHeader {
            target_rate: le_f64(&prefix, 6),
            start: le_f64(&prefix, 14),
            stop: le_f64(&prefix, 22),
            method: read_string(&mut file)?,
        };

        let index_offset = seek_index(&mut file)?;
        file.seek(SeekFrom::Start(index_offset))?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        check_magic(&magic, INDEX_MAGIC)?;

        let count = read_u32(&mut file)?;
        let mut index = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = read_string(&mut file)?;
            let offset = read_u64(&mut file)?;
            index.push((name, offset));
        }

        Ok(Self {
            file: Mutex::new(file),
            header,
            compression,
            index,
        })
    }

    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    /// Dataset names in write order.
    pub fn dataset_names(&self) -> Vec<&str> {
        self.index.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn channels(&self) -> Result<Vec<String>> {
        self.read_strings(CHANNELS_DATASET)
    }

    pub fn read_strings(&self, name: &str) -> Result<Vec<String>> {
        let (kind, rows, _, raw) = self.read_dataset(name)?;
        if kind != DatasetKind::Strings {
            return Err(FrameError::CorruptedData(format!("{} is not a string dataset", name)));
        }
        let mut cursor = Cursor::new(raw);
        (0..rows).map(|_| read_string(&mut cursor)).collect()
    }

    pub fn read_matrix(&self, name: &str) -> Result<Matrix> {
        let (kind, rows, cols, raw) = self.read_dataset(name)?;
        if kind != DatasetKind::Matrix {
            return Err(FrameError::CorruptedData(format!("{} is not a matrix dataset", name)));
        }
        let data = decode_samples(&raw);
        if data.len() != rows * cols {
            return Err(FrameError::CorruptedData(format!(
                "{}: expected {}x{} values, got {}",
                name,
                rows,
                cols,
                data.len()
            )));
        }
        Ok(Matrix { rows, cols, data })
    }

    fn read_dataset(&self, name: &str) -> Result<(DatasetKind, usize, usize, Vec<u8>)> {
        let offset = self
            .index
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, offset)| *offset)
            .ok_or_else(|| FrameError::DatasetNotFound(name.to_string()))?;

        let mut file = self
            .file
            .lock()
            .map_err(|_| FrameError::CorruptedData("Chunk file lock poisoned".to_string()))?;
        file.seek(SeekFrom::Start(offset))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != DATASET_MAGIC {
            return Err(FrameError::CorruptedData("Invalid dataset magic".to_string()));
        }
        let stored_name = read_string(&mut *file)?;
        if stored_name != name {
            return Err(FrameError::CorruptedData(format!(
                "index points {} at dataset {}",
                name, stored_name
            )));
        }

        let mut header = [0u8; DATASET_HEADER_SIZE];
        file.read_exact(&mut header)?;
        let kind = DatasetKind::from_u8(header[0])
            .ok_or_else(|| FrameError::CorruptedData(format!("unknown dataset kind {}", header[0])))?;
        let rows = le_u32(&header, 1) as usize;
        let cols = le_u32(&header, 5) as usize;
        let raw_length = le_u32(&header, 9) as usize;
        let compressed_length = le_u32(&header, 13) as usize;

        let mut packed = vec![0u8; compressed_length];
        file.read_exact(&mut packed)?;
        drop(file);

        let raw = decompress(&packed, self.compression)?;
        if raw.len() != raw_length {
            return Err(FrameError::CorruptedData(format!(
                "{}: expected {} bytes, got {}",
                name,
                raw_length,
                raw.len()
            )));
        }
        Ok((kind, rows, cols, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ChunkHeader {
        ChunkHeader {
            target_rate: 50.0,
            start: 100.0,
            stop: 125.5,
            method: "filt".to_string(),
        }
    }

    #[test]
    fn test_file_and_dataset_names() {
        assert_eq!(
            chunk_file_name(&header()),
            "downsampled_f50_gs100_ge125.5_filt.dsck"
        );
        assert_eq!(
            window_dataset_name(&Segment::new(110.0, 120.0)),
            "data_gs110_ge120"
        );
        assert_eq!(
            window_dataset_name(&Segment::new(120.0, 125.5)),
            "data_gs120_ge125.5"
        );
    }

    #[test]
    fn test_write_then_read_datasets() {
        let dir = tempfile::tempdir().unwrap();
        let channels = vec!["V1:A".to_string(), "V1:B".to_string()];
        let matrix = Matrix::stack(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0]]);

        let mut writer = ChunkWriter::create(dir.path(), &header(), CompressionType::Zstd).unwrap();
        writer.write_strings(CHANNELS_DATASET, &channels).unwrap();
        writer.write_matrix("data_gs100_ge110", &matrix).unwrap();
        let path = writer.finish().unwrap();
        assert_eq!(path, dir.path().join(chunk_file_name(&header())));

        let reader = ChunkReader::open(&path).unwrap();
        assert_eq!(reader.header(), &header());
        assert_eq!(reader.dataset_names(), vec!["channels", "data_gs100_ge110"]);
        assert_eq!(reader.channels().unwrap(), channels);

        let back = reader.read_matrix("data_gs100_ge110").unwrap();
        assert_eq!((back.rows, back.cols), (2, 3));
        assert_eq!(back.row(0), &[1.0, 2.0, 3.0]);
        assert!(back.row(1)[2].is_nan());
    }

    #[test]
    fn test_unfinished_chunk_not_visible() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ChunkWriter::create(dir.path(), &header(), CompressionType::None).unwrap();
        writer.write_strings(CHANNELS_DATASET, &[]).unwrap();
        assert!(!writer.path().exists());
        drop(writer);
        assert!(!dir.path().join(chunk_file_name(&header())).exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_sub_second_bounds_get_distinct_names() {
        let quarter = |start: f64| ChunkHeader {
            target_rate: 50.0,
            start,
            stop: start + 0.25,
            method: "mean".to_string(),
        };
        let names: HashSet<String> = [100.0, 100.25, 100.5, 100.75]
            .into_iter()
            .map(|start| chunk_file_name(&quarter(start)))
            .collect();
        assert_eq!(names.len(), 4);
        assert!(names.contains("downsampled_f50_gs100.25_ge100.5_mean.dsck"));
    }

    #[test]
    fn test_duplicate_dataset_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ChunkWriter::create(dir.path(), &header(), CompressionType::None).unwrap();
        writer.write_strings(CHANNELS_DATASET, &[]).unwrap();
        assert!(writer.write_strings(CHANNELS_DATASET, &[]).is_err());
    }

    #[test]
    fn test_missing_and_mistyped_datasets() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ChunkWriter::create(dir.path(), &header(), CompressionType::Lz4).unwrap();
        writer.write_strings(CHANNELS_DATASET, &["X".to_string()]).unwrap();
        let reader = ChunkReader::open(writer.finish().unwrap()).unwrap();

        assert!(matches!(
            reader.read_matrix("data_gs0_ge10"),
            Err(FrameError::DatasetNotFound(_))
        ));
        assert!(matches!(
            reader.read_matrix(CHANNELS_DATASET),
            Err(FrameError::CorruptedData(_))
        ));
    }
}
