use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Every failure the engine can report.
///
/// Data errors (`MalformedDocument`, `OutOfRange` during ingestion) are logged and the
/// offending document skipped; everything else aborts the current call.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("period boundaries must be strictly increasing with at least two entries, got {0:?}")]
    InvalidBoundaries(Vec<i32>),

    #[error("year {year} is outside the declared range [{start}, {end})")]
    OutOfRange { year: i32, start: i32, end: i32 },

    #[error("period {0} is not declared")]
    UnknownPeriod(i32),

    #[error("keyword list is empty")]
    EmptyKeywords,

    #[error("keyword list mixes n-gram arities {0:?}")]
    MixedArity(Vec<usize>),

    #[error("n-gram arity {found} does not match the current arity {expected}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("n-gram arity must be at least 1")]
    ZeroArity,

    #[error("invalid n-gram `{0}`")]
    InvalidNGram(String),

    #[error("unknown weighting scheme `{0}` (expected three letters: tf n|l|b, df n|t, norm n|c)")]
    InvalidScheme(String),

    #[error("unknown linkage method `{0}`")]
    InvalidLinkage(String),

    #[error("invalid cluster count `{0}`")]
    InvalidClusterSpec(String),

    #[error("cannot form {k} clusters from {rows} active rows")]
    InvalidClusterCount { k: usize, rows: usize },

    #[error("automatic cluster selection needs at least 4 active rows, got {rows}")]
    ClusteringUnavailable { rows: usize },

    #[error("no linkage matrix has been computed")]
    LinkageMissing,

    #[error("malformed document `{id}`: {reason}")]
    MalformedDocument { id: String, reason: String },

    #[error("score matrix shape mismatch: {rows} row labels, {cols} column labels, data {data_rows}x{data_cols}")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        data_rows: usize,
        data_cols: usize,
    },

    #[error("output path is empty")]
    EmptyOutputPath,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR error: {0}")]
    Cbor(#[from] serde_cbor::Error),
}

impl AnalysisError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalysisError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisError::MalformedDocument {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Data errors are recoverable per document.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            AnalysisError::MalformedDocument { .. } | AnalysisError::OutOfRange { .. }
        )
    }
}
