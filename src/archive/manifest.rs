// Manifest of archived frame files

use crate::core::constants::MAX_FILE_REF_LEN;
use crate::core::error::{FrameError, Result};
use std::path::Path;
use tracing::debug;

/// One manifest row: a file reference and the interval it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestRecord {
    pub file_ref: String,
    pub start: f64,
    pub duration: f64,
}

impl ManifestRecord {
    pub fn new(file_ref: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            file_ref: file_ref.into(),
            start,
            duration,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Which whitespace-separated columns hold the reference, start and duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestColumns {
    pub file_ref: usize,
    pub start: usize,
    pub duration: usize,
}

impl Default for ManifestColumns {
    fn default() -> Self {
        Self {
            file_ref: 0,
            start: 1,
            duration: 2,
        }
    }
}

/// Ordered manifest records, immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    records: Vec<ManifestRecord>,
}

impl Manifest {
    pub fn from_records(records: Vec<ManifestRecord>) -> Self {
        Self { records }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_columns(path, ManifestColumns::default())
    }

    pub fn load_with_columns<P: AsRef<Path>>(path: P, columns: ManifestColumns) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let manifest = Self::parse_with_columns(&text, columns)?;
        debug!(
            "Loaded {} manifest records from {}",
            manifest.len(),
            path.as_ref().display()
        );
        Ok(manifest)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with_columns(text, ManifestColumns::default())
    }

    /// Blank lines and `#` comments are skipped; extra columns are ignored.
    pub fn parse_with_columns(text: &str, columns: ManifestColumns) -> Result<Self> {
        let mut records = Vec::new();

        for (i, line) in text.lines().enumerate() {
            let line_no = i + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            let field = |idx: usize, what: &str| {
                fields.get(idx).copied().ok_or_else(|| FrameError::ParseError {
                    line: line_no,
                    reason: format!("missing {} column {}", what, idx),
                })
            };
            let number = |idx: usize, what: &str| -> Result<f64> {
                let raw = field(idx, what)?;
                let value: f64 = raw.parse().map_err(|_| FrameError::ParseError {
                    line: line_no,
                    reason: format!("{} is not a number: {:?}", what, raw),
                })?;
                if !value.is_finite() {
                    return Err(FrameError::ParseError {
                        line: line_no,
                        reason: format!("{} is not finite", what),
                    });
                }
                Ok(value)
            };

            let file_ref = field(columns.file_ref, "file reference")?;
            if file_ref.len() > MAX_FILE_REF_LEN {
                return Err(FrameError::ParseError {
                    line: line_no,
                    reason: format!(
                        "file reference longer than {} characters",
                        MAX_FILE_REF_LEN
                    ),
                });
            }
            let start = number(columns.start, "start")?;
            let duration = number(columns.duration, "duration")?;
            if duration <= 0.0 {
                return Err(FrameError::ParseError {
                    line: line_no,
                    reason: format!("non-positive duration {}", duration),
                });
            }

            records.push(ManifestRecord::new(file_ref, start, duration));
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[ManifestRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Renders the manifest in the three-column text layout `parse` accepts.
    pub fn to_text(&self) -> String {
        self.records
            .iter()
            .map(|r| format!("{} {} {}\n", r.file_ref, r.start, r.duration))
            .collect()
    }
}
