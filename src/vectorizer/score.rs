use std::{
    sync::OnceLock,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    cluster::tsne,
    config::TsneConfig,
    document::{detect_arity, AuthorKey, NGram},
    error::{AnalysisError, Result},
    persist,
    period::PeriodId,
    vectorizer::{
        author::AuthorAggregates,
        compute::{Compare, DefaultCompare},
        tfidf::{TFIDFEngine, TFIDFModel},
        vocab::PeriodCorpus,
    },
};

/// Dense authors x keywords weight matrix of one period.
///
/// Row and column labels always match the data shape; this is checked on
/// construction and again when a snapshot is deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScoreMatrix")]
pub struct ScoreMatrix {
    period: PeriodId,
    rows: Vec<AuthorKey>,
    cols: Vec<NGram>,
    data: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct RawScoreMatrix {
    period: PeriodId,
    rows: Vec<AuthorKey>,
    cols: Vec<NGram>,
    data: Vec<Vec<f64>>,
}

impl TryFrom<RawScoreMatrix> for ScoreMatrix {
    type Error = AnalysisError;

    fn try_from(raw: RawScoreMatrix) -> Result<Self> {
        ScoreMatrix::from_parts(raw.period, raw.rows, raw.cols, raw.data)
    }
}

impl ScoreMatrix {
    pub fn from_parts(
        period: PeriodId,
        rows: Vec<AuthorKey>,
        cols: Vec<NGram>,
        data: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let ragged = data.iter().find(|r| r.len() != cols.len());
        if rows.len() != data.len() || ragged.is_some() {
            return Err(AnalysisError::ShapeMismatch {
                rows: rows.len(),
                cols: cols.len(),
                data_rows: data.len(),
                data_cols: ragged.map_or(cols.len(), Vec::len),
            });
        }
        Ok(Self {
            period,
            rows,
            cols,
            data,
        })
    }

    /// One row per aggregated author, one column per keyword.
    /// A keyword the vocabulary does not know, or whose weight was dropped, scores 0.
    pub fn build<E: TFIDFEngine>(
        corpus: &PeriodCorpus,
        model: &TFIDFModel<E>,
        aggregates: &AuthorAggregates,
        keywords: &[NGram],
    ) -> Result<Self> {
        let arity = detect_arity(keywords)?;
        if arity != corpus.arity {
            return Err(AnalysisError::ArityMismatch {
                expected: corpus.arity,
                found: arity,
            });
        }
        let ids: Vec<_> = keywords
            .iter()
            .map(|k| corpus.vocabulary.id(&k.joined()))
            .collect();
        let mut rows = Vec::with_capacity(aggregates.len());
        let mut data = Vec::with_capacity(aggregates.len());
        for (author, bow) in aggregates.iter() {
            let weights = model.apply(bow);
            let row = ids
                .iter()
                .map(|id| {
                    id.and_then(|id| weights.binary_search_by_key(&id, |(t, _)| *t).ok())
                        .map_or(0.0, |pos| weights[pos].1)
                })
                .collect();
            rows.push(author.clone());
            data.push(row);
        }
        Self::from_parts(aggregates.period, rows, keywords.to_vec(), data)
    }

    pub fn period(&self) -> PeriodId {
        self.period
    }

    pub fn rows(&self) -> &[AuthorKey] {
        &self.rows
    }

    pub fn cols(&self) -> &[NGram] {
        &self.cols
    }

    pub fn data(&self) -> &[Vec<f64>] {
        &self.data
    }

    pub fn get(&self, author: &AuthorKey, keyword: &NGram) -> Option<f64> {
        let r = self.rows.iter().position(|a| a == author)?;
        let c = self.cols.iter().position(|k| k == keyword)?;
        Some(self.data[r][c])
    }

    /// Splits authors into active rows (some nonzero weight) and omitted authors.
    pub fn partition(&self) -> ActiveMatrix {
        let mut authors = Vec::new();
        let mut rows = Vec::new();
        let mut omitted = Vec::new();
        for (author, row) in self.rows.iter().zip(&self.data) {
            if row.iter().any(|v| *v != 0.0) {
                authors.push(author.clone());
                rows.push(row.clone());
            } else {
                omitted.push(author.clone());
            }
        }
        ActiveMatrix {
            period: self.period,
            authors,
            cols: self.cols.clone(),
            rows,
            omitted,
            tsne: TsneConfig::default(),
            embedding: OnceLock::new(),
        }
    }

    /// Full matrix as CSV: `author_keywords,<keyword>...` header, one line per author.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("author_keywords");
        for col in &self.cols {
            out.push(',');
            out.push_str(&csv_field(&col.joined()));
        }
        out.push('\n');
        for (author, row) in self.rows.iter().zip(&self.data) {
            out.push_str(&csv_field(author.as_str()));
            for v in row {
                out.push(',');
                out.push_str(&v.to_string());
            }
            out.push('\n');
        }
        out
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = persist::checked_output_path(path.as_ref())?;
        let file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(self.to_csv().as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| AnalysisError::io(path, e))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        persist::write_snapshot(self, path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        persist::read_snapshot(path)
    }
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Active rows of a score matrix, ready for clustering and projection.
/// The 2-D embedding is computed once per instance and shared by every
/// clustering run over it.
#[derive(Debug, Clone)]
pub struct ActiveMatrix {
    pub period: PeriodId,
    pub authors: Vec<AuthorKey>,
    pub cols: Vec<NGram>,
    pub rows: Vec<Vec<f64>>,
    pub omitted: Vec<AuthorKey>,
    tsne: TsneConfig,
    embedding: OnceLock<Vec<[f64; 2]>>,
}

impl ActiveMatrix {
    /// Projection parameters used by `embedding`; drops any cached embedding.
    pub fn with_projection(mut self, config: TsneConfig) -> Self {
        self.tsne = config;
        self.embedding = OnceLock::new();
        self
    }

    pub fn projection(&self) -> &TsneConfig {
        &self.tsne
    }

    /// 2-D t-SNE coordinates, aligned with `authors`.
    pub fn embedding(&self) -> &[[f64; 2]] {
        self.embedding.get_or_init(|| tsne::embed(&self.rows, &self.tsne))
    }

    pub fn is_embedded(&self) -> bool {
        self.embedding.get().is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pairwise cosine similarity of active authors.
    pub fn similarity_matrix(&self) -> Vec<Vec<f64>> {
        self.rows
            .par_iter()
            .map(|a| {
                self.rows
                    .iter()
                    .map(|b| <DefaultCompare as Compare<f64>>::cosine_similarity(a, b))
                    .collect()
            })
            .collect()
    }
}

/// Writes a square similarity matrix as CSV labelled by author on both axes.
pub fn write_similarity_csv(
    authors: &[AuthorKey],
    matrix: &[Vec<f64>],
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = persist::checked_output_path(path.as_ref())?;
    let mut out = String::from("author");
    for a in authors {
        out.push(',');
        out.push_str(&csv_field(a.as_str()));
    }
    out.push('\n');
    for (a, row) in authors.iter().zip(matrix) {
        out.push_str(&csv_field(a.as_str()));
        for v in row {
            out.push(',');
            out.push_str(&v.to_string());
        }
        out.push('\n');
    }
    fs::write(path, out).map_err(|e| AnalysisError::io(path, e))
}
