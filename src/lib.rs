/// This crate is a period-partitioned corpus analytics engine.
/// Dated, authored, tokenized documents are bucketed into time periods; each
/// period gets n-gram frequency statistics, a vocabulary and a TF-IDF model,
/// per-author aggregates, and author clustering with a 2-D projection.
pub mod cluster;
pub mod config;
pub mod document;
pub mod error;
pub mod period;
pub mod persist;
pub mod session;
pub mod source;
pub mod utils;
pub mod vectorizer;

/// Analysis Session
/// The entry point of this crate.
/// It owns the ingested documents in canonical order (sorted by document id)
/// and the lazily built caches derived from them:
/// - The frequency record of the current n-gram arity
/// - The vocabulary and weighting model of every period
///
/// Caches are rebuilt when another arity is requested or documents are added.
/// A session can also be resumed from a saved `FrequencyRecord`, in which case
/// frequency queries work without the raw documents.
pub use session::{AnalysisSession, IngestReport};

/// Period Index
/// 年を期間に割り当てる
/// Half-open periods `[b_i, b_{i+1})` built from strictly increasing boundaries.
/// A period is identified by its lower bound; `PeriodMap` keeps per-period
/// results in ascending period order.
pub use period::{PeriodId, PeriodIndex, PeriodMap};

/// Documents and keys
/// - `Document`: id, author, year and tokens
/// - `AuthorKey`: normalized author identity used for aggregation
/// - `NGram`: a query key of one or more tokens; all keys of a query share one arity
pub use document::{AuthorKey, Document, NGram};

/// Configuration
/// Every knob of an analysis as typed values: stop words, weighting scheme,
/// model scope for author scores, k-means and t-SNE parameters.
///
/// # Serialization
/// Supported. `AnalysisConfig::from_json_file` reads a JSON file where every
/// field is optional.
pub use config::{AnalysisConfig, ClusterCount, KMeansConfig, ModelScope, StopWords, TsneConfig};

/// Error type
/// Data errors (malformed or out-of-range documents) are logged and skipped,
/// everything else is returned to the caller.
pub use error::{AnalysisError, Result};

/// Frequency Record
/// Per-period n-gram counts of one arity, with global / average frequency,
/// variance and top-n statistics. `raw_frequency` reports per-document
/// keyword counts or presence instead.
///
/// # Serialization
/// Supported, JSON or CBOR, keeping the `__N__` / `NUM_DOCS` / `TOTAL_WORDS` /
/// `FDIST` field names.
pub use vectorizer::frequency::{raw_frequency, DocumentFrequency, FrequencyRecord, KeyStats};

/// TF IDF Calculation Engine Trait
/// A trait that defines the behavior of a term weighting engine.
///
/// By implementing this trait, you can plug different weighting strategies into
/// `TFIDFModel<E>`.
/// The default implementation, `WeightingScheme`, covers the SMART letters
/// tf `n|l|b`, df `n|t` and normalization `n|c`.
pub use vectorizer::tfidf::{PeriodModel, TFIDFEngine, TFIDFModel, WeightingScheme};

/// Search Hits and Hit Entry structures
/// - `Hits`: documents ranked by the weight of a keyword, sortable by score
/// - `HitEntry`: a single result entry, containing the document id and score
pub use vectorizer::tfidf::{HitEntry, Hits};

/// Score Matrix
/// Authors x keywords weights of one period.
/// `partition` splits it into the active rows used for clustering and the
/// authors with no weight at all.
///
/// # Serialization
/// Supported; the row and column labels are checked against the data shape
/// on load.
pub use vectorizer::score::{ActiveMatrix, ScoreMatrix};

/// Clustering
/// `AuthorCluster` runs k-means (fixed or elbow-selected k) or agglomerative
/// clustering over an `ActiveMatrix`, and every result carries the shared
/// t-SNE embedding of the matrix.
pub use cluster::{
    hierarchical::{LinkageMatrix, LinkageMethod},
    results::ClusterResult,
    AuthorCluster, ClusterState, HierarchicalOutcome,
};

/// Snapshot source for the clustering stage.
pub use persist::ScoreSource;
