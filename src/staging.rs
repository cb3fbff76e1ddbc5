use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::db::{Review, VehicleSpec};

pub const STAGING_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to access staging file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path:?} line {line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path:?} line {line}: unsupported staging version {version}")]
    Version { path: PathBuf, line: usize, version: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagedRecord {
    Review(Review),
    Spec(VehicleSpec),
}

impl From<Review> for StagedRecord {
    fn from(r: Review) -> Self {
        StagedRecord::Review(r)
    }
}

impl From<VehicleSpec> for StagedRecord {
    fn from(s: VehicleSpec) -> Self {
        StagedRecord::Spec(s)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StagedLine {
    version: u32,
    staged_at: DateTime<Utc>,
    #[serde(flatten)]
    record: StagedRecord,
}

/// Records read back from a staging file, split by kind.
#[derive(Debug, Default)]
pub struct Staged {
    pub reviews: Vec<Review>,
    pub specs: Vec<VehicleSpec>,
}

/// Write records as JSON lines, replacing any existing file.
pub fn write<R>(path: &Path, records: &[R]) -> Result<usize, StagingError>
where
    R: Clone + Into<StagedRecord>,
{
    let io_err = |source: std::io::Error| StagingError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    let staged_at = Utc::now();

    for (idx, record) in records.iter().enumerate() {
        let line = StagedLine {
            version: STAGING_VERSION,
            staged_at,
            record: record.clone().into(),
        };
        serde_json::to_writer(&mut out, &line).map_err(|source| StagingError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        out.write_all(b"\n").map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;

    info!(path = %path.display(), records = records.len(), "Staged records");
    Ok(records.len())
}

/// Read a staging file. Blank lines are skipped; any malformed line or
/// unknown version fails the whole read.
pub fn read(path: &Path) -> Result<Staged, StagingError> {
    let io_err = |source: std::io::Error| StagingError::Io {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut staged = Staged::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: StagedLine = serde_json::from_str(&line).map_err(|source| StagingError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        if parsed.version != STAGING_VERSION {
            return Err(StagingError::Version {
                path: path.to_path_buf(),
                line: idx + 1,
                version: parsed.version,
            });
        }
        match parsed.record {
            StagedRecord::Review(r) => staged.reviews.push(r),
            StagedRecord::Spec(s) => staged.specs.push(s),
        }
    }

    Ok(staged)
}
