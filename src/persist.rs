//! Snapshot persistence.
//!
//! `.cbor` paths are written with `serde_cbor`, everything else as pretty JSON.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::{
    error::{AnalysisError, Result},
    vectorizer::score::ScoreMatrix,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Cbor,
}

impl SnapshotFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("cbor") => SnapshotFormat::Cbor,
            _ => SnapshotFormat::Json,
        }
    }
}

/// Rejects an empty path and creates missing parent directories.
pub(crate) fn checked_output_path(path: &Path) -> Result<&Path> {
    if path.as_os_str().is_empty() {
        return Err(AnalysisError::EmptyOutputPath);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
    }
    Ok(path)
}

pub fn write_snapshot<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = checked_output_path(path.as_ref())?;
    let file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    match SnapshotFormat::from_path(path) {
        SnapshotFormat::Json => serde_json::to_writer_pretty(&mut writer, value)?,
        SnapshotFormat::Cbor => serde_cbor::to_writer(&mut writer, value)?,
    }
    writer.flush().map_err(|e| AnalysisError::io(path, e))?;
    debug!(path = %path.display(), "snapshot written");
    Ok(())
}

pub fn read_snapshot<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let reader = BufReader::new(file);
    let value = match SnapshotFormat::from_path(path) {
        SnapshotFormat::Json => serde_json::from_reader(reader)?,
        SnapshotFormat::Cbor => serde_cbor::from_reader(reader)?,
    };
    Ok(value)
}

/// Where the clustering stage takes its score matrix from.
#[derive(Debug, Clone)]
pub enum ScoreSource {
    InMemory(ScoreMatrix),
    FromPersistedSnapshot(PathBuf),
}

impl ScoreSource {
    /// Loads (and validates) the matrix once.
    pub fn resolve(self) -> Result<ScoreMatrix> {
        match self {
            ScoreSource::InMemory(m) => Ok(m),
            ScoreSource::FromPersistedSnapshot(path) => ScoreMatrix::load(path),
        }
    }
}

impl From<ScoreMatrix> for ScoreSource {
    fn from(m: ScoreMatrix) -> Self {
        ScoreSource::InMemory(m)
    }
}
