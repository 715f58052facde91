use std::{fmt, fs, path::Path, str::FromStr};

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AnalysisError, Result},
    vectorizer::tfidf::WeightingScheme,
};

/// Explicit stop-word set.
///
/// On disk this uses the `{"Words": [...]}` layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopWords {
    #[serde(rename = "Words")]
    words: AHashSet<String>,
}

impl StopWords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    #[inline]
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Which collection a weighting model is fitted on when building author scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelScope {
    /// the period's documents
    #[default]
    Documents,
    /// the period's author aggregates, one pseudo-document per author
    Authors,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    pub max_iter: usize,
    /// relative to the mean per-feature variance of the data
    pub tol: f64,
    /// independent seeded restarts; the lowest inertia wins
    pub n_init: usize,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TsneConfig {
    pub perplexity: f64,
    pub learning_rate: f64,
    pub iterations: usize,
    pub early_exaggeration: f64,
    pub exaggeration_iters: usize,
    pub seed: u64,
}

impl Default for TsneConfig {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            learning_rate: 200.0,
            iterations: 1000,
            early_exaggeration: 12.0,
            exaggeration_iters: 250,
            seed: 0,
        }
    }
}

/// Requested number of k-means clusters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterCount {
    /// elbow selection over `1..=rows/4`
    #[default]
    Auto,
    Fixed(usize),
}

impl FromStr for ClusterCount {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(ClusterCount::Auto);
        }
        match s.parse::<usize>() {
            Ok(k) if k > 0 => Ok(ClusterCount::Fixed(k)),
            _ => Err(AnalysisError::InvalidClusterSpec(s.to_string())),
        }
    }
}

impl fmt::Display for ClusterCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterCount::Auto => f.write_str("auto"),
            ClusterCount::Fixed(k) => write!(f, "{k}"),
        }
    }
}

/// All knobs of an analysis session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub stop_words: StopWords,
    pub scheme: WeightingScheme,
    pub author_scope: ModelScope,
    pub kmeans: KMeansConfig,
    pub tsne: TsneConfig,
}

impl AnalysisConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn with_stop_words(mut self, stop_words: StopWords) -> Self {
        self.stop_words = stop_words;
        self
    }

    pub fn with_scheme(mut self, scheme: WeightingScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_author_scope(mut self, scope: ModelScope) -> Self {
        self.author_scope = scope;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::vectorizer::tfidf::{DfTransform, Normalization, TfTransform};

    #[test]
    fn stop_words_file_layout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"Words": ["the", "of"]}}"#).unwrap();
        let stop = StopWords::from_json_file(file.path()).unwrap();
        assert!(stop.contains("the"));
        assert!(stop.contains("of"));
        assert!(!stop.contains("cat"));
        assert_eq!(stop.len(), 2);
    }

    #[test]
    fn missing_stop_word_file_is_io_error() {
        let err = StopWords::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
    }

    #[test]
    fn cluster_count_parsing() {
        assert_eq!("auto".parse::<ClusterCount>().unwrap(), ClusterCount::Auto);
        assert_eq!(" 3 ".parse::<ClusterCount>().unwrap(), ClusterCount::Fixed(3));
        assert!("0".parse::<ClusterCount>().is_err());
        assert!("many".parse::<ClusterCount>().is_err());
        assert_eq!(ClusterCount::Fixed(4).to_string(), "4");
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let cfg: AnalysisConfig = serde_json::from_str(r#"{"scheme": "ltn", "kmeans": {"n_init": 2}}"#).unwrap();
        assert_eq!(cfg.scheme.tf, TfTransform::Log);
        assert_eq!(cfg.scheme.df, DfTransform::Idf);
        assert_eq!(cfg.scheme.norm, Normalization::None);
        assert_eq!(cfg.kmeans.n_init, 2);
        assert_eq!(cfg.kmeans.max_iter, 300);
        assert_eq!(cfg.tsne, TsneConfig::default());
        assert_eq!(cfg.author_scope, ModelScope::Documents);
        assert!(cfg.stop_words.is_empty());
    }
}
