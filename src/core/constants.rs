// Format constants for frame files and downsampled chunk files

pub const FRAME_MAGIC: &[u8; 4] = b"FRME";
pub const BLOCK_MAGIC: &[u8; 4] = b"BLCK";
pub const CHUNK_MAGIC: &[u8; 4] = b"DSCK";
pub const DATASET_MAGIC: &[u8; 4] = b"DSET";
pub const INDEX_MAGIC: &[u8; 4] = b"IDXT";
pub const FOOTER_MAGIC: &[u8; 4] = b"FTER";

pub const FORMAT_VERSION: u8 = 1;

// Compression codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None = 0,
    Zlib = 1,
    Lz4 = 2,
    Zstd = 3,
}

impl CompressionType {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Zlib),
            2 => Some(CompressionType::Lz4),
            3 => Some(CompressionType::Zstd),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(CompressionType::None),
            "zlib" => Some(CompressionType::Zlib),
            "lz4" => Some(CompressionType::Lz4),
            "zstd" => Some(CompressionType::Zstd),
            _ => None,
        }
    }
}

// Samples are stored as little-endian f64
pub const SAMPLE_SIZE: usize = 8;

// Frame header prefix: MAGIC(4) version(u8) comp(u8) start(f64) duration(f64) chan_count(u16)
pub const FRAME_HEADER_PREFIX_SIZE: usize = 4 + 1 + 1 + 8 + 8 + 2; // 24 bytes

// Block header: channel_id(u32) n(u32) raw_len(u32) comp_len(u32) start(f64)
pub const BLOCK_HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 8; // 24 bytes

// Frame index entry: cid(u32) offset(u64) start(f64) stop(f64)
pub const INDEX_ENTRY_SIZE: usize = 4 + 8 + 8 + 8; // 28 bytes

// Chunk header prefix: MAGIC(4) version(u8) comp(u8) target_rate(f64) start(f64) stop(f64)
pub const CHUNK_HEADER_PREFIX_SIZE: usize = 4 + 1 + 1 + 8 + 8 + 8; // 30 bytes

// Dataset header: kind(u8) rows(u32) cols(u32) raw_len(u32) comp_len(u32)
pub const DATASET_HEADER_SIZE: usize = 1 + 4 + 4 + 4 + 4; // 17 bytes

// Footer: FOOTER_MAGIC(4) index_offset(u64)
pub const FOOTER_SIZE: usize = 4 + 8; // 12 bytes

// Manifest file references are bounded
pub const MAX_FILE_REF_LEN: usize = 100;
