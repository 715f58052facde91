use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::StopWords,
    document::{Document, NGram},
    error::{AnalysisError, Result},
    period::PeriodId,
    vectorizer::vocab::{weighting_terms, BagOfWords, PeriodCorpus, TermId, Vocabulary},
};

/// Weights at or below this magnitude are dropped from weighted vectors.
pub const WEIGHT_EPSILON: f64 = 1e-12;

/// Sparse weights sorted by term id.
pub type WeightedVector = Vec<(TermId, f64)>;

/// Term frequency component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TfTransform {
    /// `n`: raw count
    Raw,
    /// `l`: 1 + ln(count)
    Log,
    /// `b`: 1 if present
    Boolean,
}

/// Document frequency component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DfTransform {
    /// `n`
    None,
    /// `t`: ln(N / df)
    Idf,
}

/// Normalization component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    /// `n`
    None,
    /// `c`: divide by the L2 norm
    Cosine,
}

/// Three-axis weighting scheme written as SMART letters, e.g. `"ntc"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeightingScheme {
    pub tf: TfTransform,
    pub df: DfTransform,
    pub norm: Normalization,
}

impl Default for WeightingScheme {
    fn default() -> Self {
        Self {
            tf: TfTransform::Raw,
            df: DfTransform::Idf,
            norm: Normalization::Cosine,
        }
    }
}

impl FromStr for WeightingScheme {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AnalysisError::InvalidScheme(s.to_string());
        let letters: Vec<char> = s.trim().chars().collect();
        let [tf, df, norm] = letters[..] else {
            return Err(invalid());
        };
        let tf = match tf.to_ascii_lowercase() {
            'n' => TfTransform::Raw,
            'l' => TfTransform::Log,
            'b' => TfTransform::Boolean,
            _ => return Err(invalid()),
        };
        let df = match df.to_ascii_lowercase() {
            'n' => DfTransform::None,
            't' => DfTransform::Idf,
            _ => return Err(invalid()),
        };
        let norm = match norm.to_ascii_lowercase() {
            'n' => Normalization::None,
            'c' => Normalization::Cosine,
            _ => return Err(invalid()),
        };
        Ok(Self { tf, df, norm })
    }
}

impl fmt::Display for WeightingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tf = match self.tf {
            TfTransform::Raw => 'n',
            TfTransform::Log => 'l',
            TfTransform::Boolean => 'b',
        };
        let df = match self.df {
            DfTransform::None => 'n',
            DfTransform::Idf => 't',
        };
        let norm = match self.norm {
            Normalization::None => 'n',
            Normalization::Cosine => 'c',
        };
        write!(f, "{tf}{df}{norm}")
    }
}

impl TryFrom<String> for WeightingScheme {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<WeightingScheme> for String {
    fn from(value: WeightingScheme) -> Self {
        value.to_string()
    }
}

/// TF-IDF計算エンジン
/// Plugging a different engine into `TFIDFModel<E>` changes how counts become weights.
pub trait TFIDFEngine {
    /// term frequency weight of a raw count
    fn tf(&self, count: u32) -> f64;
    /// # Arguments
    /// * `doc_num` - documents in the fitted collection
    /// * `doc_freq` - documents containing the term, at least 1
    fn idf(&self, doc_num: u64, doc_freq: u64) -> f64;
    /// in-place normalization of one weighted vector
    fn normalize(&self, weights: &mut [(TermId, f64)]);
}

impl TFIDFEngine for WeightingScheme {
    #[inline]
    fn tf(&self, count: u32) -> f64 {
        match self.tf {
            TfTransform::Raw => count as f64,
            TfTransform::Log => {
                if count == 0 {
                    0.0
                } else {
                    1.0 + (count as f64).ln()
                }
            }
            TfTransform::Boolean => {
                if count > 0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    #[inline]
    fn idf(&self, doc_num: u64, doc_freq: u64) -> f64 {
        match self.df {
            DfTransform::None => 1.0,
            DfTransform::Idf => (doc_num as f64 / doc_freq as f64).ln(),
        }
    }

    fn normalize(&self, weights: &mut [(TermId, f64)]) {
        if self.norm == Normalization::None {
            return;
        }
        let norm = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            weights.iter_mut().for_each(|(_, w)| *w /= norm);
        }
    }
}

/// Fitted term-weighting model.
/// Immutable after `fit`; `apply` is a pure function of its input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TFIDFModel<E = WeightingScheme> {
    engine: E,
    doc_num: u64,
    /// per term id; 0 for terms no fitted document contains
    doc_freq: Vec<u64>,
}

impl<E: TFIDFEngine> TFIDFModel<E> {
    /// Counts documents and per-term document frequencies over `corpus`.
    pub fn fit<'a, I>(corpus: I, vocabulary: &Vocabulary, engine: E) -> Self
    where
        I: IntoIterator<Item = &'a BagOfWords>,
    {
        let mut doc_freq = vec![0u64; vocabulary.len()];
        let mut doc_num = 0u64;
        for bow in corpus {
            doc_num += 1;
            for (id, _) in bow.iter() {
                if let Some(df) = doc_freq.get_mut(id as usize) {
                    *df += 1;
                }
            }
        }
        Self {
            engine,
            doc_num,
            doc_freq,
        }
    }

    pub fn doc_num(&self) -> u64 {
        self.doc_num
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn doc_freq(&self, id: TermId) -> u64 {
        self.doc_freq.get(id as usize).copied().unwrap_or(0)
    }

    /// Weighted vector of `bow`. Terms the model never saw are omitted, as are
    /// weights that end up within `WEIGHT_EPSILON` of zero.
    pub fn apply(&self, bow: &BagOfWords) -> WeightedVector {
        let mut weights: WeightedVector = bow
            .iter()
            .filter_map(|(id, count)| {
                let df = self.doc_freq(id);
                if df == 0 {
                    return None;
                }
                Some((id, self.engine.tf(count) * self.engine.idf(self.doc_num, df)))
            })
            .collect();
        self.engine.normalize(&mut weights);
        weights.retain(|(_, w)| w.abs() > WEIGHT_EPSILON);
        weights
    }
}

/// Scored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitEntry {
    pub key: String,
    pub score: f64,
}

/// Ranked documents for a keyword query.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hits {
    pub list: Vec<HitEntry>,
    /// documents of the period containing the keyword, ranked or not
    #[serde(default)]
    pub num_docs: u64,
}

impl Hits {
    pub fn new(list: Vec<HitEntry>, num_docs: u64) -> Self {
        Hits { list, num_docs }
    }

    /// Descending score, ties by ascending key. NaN scores are removed.
    pub fn sort_by_score(&mut self) -> &mut Self {
        self.list.retain(|h| !h.score.is_nan());
        self.list
            .sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
        self
    }

    pub fn truncate(&mut self, n: usize) -> &mut Self {
        self.list.truncate(n);
        self
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl fmt::Debug for Hits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Hits ({} documents) [", self.num_docs)?;
            for hit in &self.list {
                writeln!(f, "    {:?}: {:.6}", hit.key, hit.score)?;
            }
            write!(f, "]")
        } else {
            f.debug_list()
                .entries(self.list.iter().map(|h| (&h.key, h.score)))
                .finish()
        }
    }
}

/// Vocabulary, corpus and fitted model of one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodModel {
    pub period: PeriodId,
    pub corpus: PeriodCorpus,
    pub model: TFIDFModel,
}

impl PeriodModel {
    pub fn build(
        period: PeriodId,
        documents: &[&Document],
        arity: usize,
        stop_words: &StopWords,
        scheme: WeightingScheme,
    ) -> Self {
        let corpus = PeriodCorpus::build(documents, arity, stop_words);
        let model = TFIDFModel::fit(corpus.bags(), &corpus.vocabulary, scheme);
        debug!(
            period,
            docs = corpus.len(),
            vocab = corpus.vocabulary.len(),
            scheme = %scheme,
            "period model fitted"
        );
        Self {
            period,
            corpus,
            model,
        }
    }

    pub fn arity(&self) -> usize {
        self.corpus.arity
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.corpus.vocabulary
    }

    /// Top `n` documents of the period by the keyword's weight.
    ///
    /// `documents` are the period's documents. Those whose raw token stream
    /// contains the keyword are counted in `num_docs`, projected onto the
    /// vocabulary and scored; a keyword outside the vocabulary ranks nothing.
    pub fn top_n_for_keyword(
        &self,
        documents: &[&Document],
        stop_words: &StopWords,
        keyword: &NGram,
        n: usize,
    ) -> Result<Hits> {
        if keyword.arity() != self.arity() {
            return Err(AnalysisError::ArityMismatch {
                expected: self.arity(),
                found: keyword.arity(),
            });
        }
        let containing: Vec<&Document> = documents
            .iter()
            .copied()
            .filter(|doc| doc.ngrams(self.arity()).any(|w| w == keyword.tokens()))
            .collect();
        let num_docs = containing.len() as u64;
        let Some(id) = self.vocabulary().id(&keyword.joined()) else {
            return Ok(Hits::new(Vec::new(), num_docs));
        };
        let list = containing
            .into_iter()
            .filter_map(|doc| {
                let terms = weighting_terms(&doc.tokens, self.arity(), stop_words);
                let weights = self.model.apply(&self.vocabulary().doc2bow(&terms));
                let pos = weights.binary_search_by_key(&id, |(t, _)| *t).ok()?;
                Some(HitEntry {
                    key: doc.id.clone(),
                    score: weights[pos].1,
                })
            })
            .collect();
        let mut hits = Hits::new(list, num_docs);
        hits.sort_by_score().truncate(n);
        Ok(hits)
    }
}
