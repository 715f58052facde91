use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    config::{AnalysisConfig, ModelScope},
    document::{detect_arity, Document, NGram},
    error::{AnalysisError, Result},
    period::{PeriodId, PeriodIndex, PeriodMap},
    vectorizer::{
        author::{partition_by_author, AuthorAggregates},
        frequency::{raw_frequency, DocumentFrequency, FrequencyRecord, KeyStats},
        score::ScoreMatrix,
        tfidf::{Hits, PeriodModel, TFIDFModel},
    },
};

/// What `AnalysisSession::ingest` did with a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub out_of_range: usize,
}

/// Owner of the documents and of everything derived from them.
///
/// Documents are kept sorted by id, which is the order every accumulation pass
/// sees them in. The frequency record and the per-period models are built on
/// first use and rebuilt only when a different n-gram arity is asked for or
/// new documents arrive.
#[derive(Debug)]
pub struct AnalysisSession {
    periods: PeriodIndex,
    config: AnalysisConfig,
    documents: Vec<Document>,
    frequency: Option<FrequencyRecord>,
    models: Option<(usize, PeriodMap<PeriodModel>)>,
    resumed: bool,
}

impl AnalysisSession {
    pub fn new(periods: PeriodIndex, config: AnalysisConfig) -> Self {
        Self {
            periods,
            config,
            documents: Vec::new(),
            frequency: None,
            models: None,
            resumed: false,
        }
    }

    /// Session over a saved frequency record. Frequency queries work at the
    /// record's arity; everything else needs documents to be ingested.
    pub fn resume(record: FrequencyRecord, config: AnalysisConfig) -> Self {
        Self {
            periods: record.periods().clone(),
            config,
            documents: Vec::new(),
            frequency: Some(record),
            models: None,
            resumed: true,
        }
    }

    pub fn periods(&self) -> &PeriodIndex {
        &self.periods
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Documents in canonical order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Adds documents, dropping malformed, out-of-range and duplicate ids
    /// (the copy seen first wins). Cached results are discarded.
    pub fn ingest<I>(&mut self, documents: I) -> IngestReport
    where
        I: IntoIterator<Item = Document>,
    {
        let mut report = IngestReport::default();
        let before = self.documents.len();
        for doc in documents {
            if let Err(e) = doc.validate() {
                warn!(doc = %doc.id, error = %e, "skipping document");
                report.malformed += 1;
                continue;
            }
            if let Err(e) = self.periods.assign(doc.year) {
                warn!(doc = %doc.id, error = %e, "skipping document");
                report.out_of_range += 1;
                continue;
            }
            self.documents.push(doc);
        }
        // stable: earlier copies stay in front of later ones
        self.documents.sort_by(|a, b| a.id.cmp(&b.id));
        let pushed = self.documents.len() - before;
        self.documents.dedup_by(|later, earlier| {
            let dup = later.id == earlier.id;
            if dup {
                warn!(doc = %later.id, "duplicate document id, keeping the first copy");
            }
            dup
        });
        report.duplicates = before + pushed - self.documents.len();
        report.accepted = pushed - report.duplicates;

        self.frequency = None;
        self.models = None;
        self.resumed = false;
        info!(
            accepted = report.accepted,
            duplicates = report.duplicates,
            malformed = report.malformed,
            out_of_range = report.out_of_range,
            total = self.documents.len(),
            "documents ingested"
        );
        report
    }

    /// Frequency record for `arity`, built on demand.
    pub fn frequency(&mut self, arity: usize) -> Result<&FrequencyRecord> {
        let record = match self.frequency.take() {
            Some(record) if record.arity() == arity => record,
            Some(record) if self.resumed => {
                let expected = record.arity();
                self.frequency = Some(record);
                return Err(AnalysisError::ArityMismatch {
                    expected,
                    found: arity,
                });
            }
            _ => FrequencyRecord::build(
                &self.periods,
                &self.documents,
                arity,
                &self.config.stop_words,
            )?,
        };
        Ok(self.frequency.insert(record))
    }

    pub fn global_frequency(&mut self, keys: &[NGram]) -> Result<PeriodMap<KeyStats>> {
        let arity = detect_arity(keys)?;
        self.frequency(arity)?.global_frequency(keys)
    }

    pub fn average_frequency(&mut self, keys: &[NGram]) -> Result<PeriodMap<KeyStats>> {
        let arity = detect_arity(keys)?;
        self.frequency(arity)?.average_frequency(keys)
    }

    pub fn variance(&mut self, keys: &[NGram]) -> Result<PeriodMap<KeyStats>> {
        let arity = detect_arity(keys)?;
        self.frequency(arity)?.variance(keys)
    }

    pub fn top_n(&mut self, n: usize, arity: usize) -> Result<PeriodMap<Vec<(String, f64)>>> {
        Ok(self.frequency(arity)?.top_n(n))
    }

    /// Vocabulary and weighting model of every period for `arity`.
    pub fn period_models(&mut self, arity: usize) -> Result<&PeriodMap<PeriodModel>> {
        if arity == 0 {
            return Err(AnalysisError::ZeroArity);
        }
        let models = match self.models.take() {
            Some((cached, models)) if cached == arity => models,
            _ => self.fit_period_models(arity),
        };
        Ok(&self.models.insert((arity, models)).1)
    }

    /// Documents of every period, in canonical order.
    fn documents_by_period(&self) -> PeriodMap<Vec<&Document>> {
        let mut grouped: PeriodMap<Vec<&Document>> = self.periods.map_with(|_| Vec::new());
        for doc in &self.documents {
            if let Some(bucket) = self
                .periods
                .assign(doc.year)
                .ok()
                .and_then(|p| grouped.get_mut(&p))
            {
                bucket.push(doc);
            }
        }
        grouped
    }

    /// Periods are independent and fitted in parallel.
    fn fit_period_models(&self, arity: usize) -> PeriodMap<PeriodModel> {
        let grouped = self.documents_by_period();
        let stop_words = &self.config.stop_words;
        let scheme = self.config.scheme;
        let fitted: Vec<(PeriodId, PeriodModel)> = grouped
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(period, docs)| {
                (period, PeriodModel::build(period, &docs, arity, stop_words, scheme))
            })
            .collect();
        info!(arity, periods = fitted.len(), %scheme, "period models fitted");
        fitted.into_iter().collect()
    }

    /// Top `n` documents per period for one keyword; every period is present.
    pub fn top_n_for_keyword(&mut self, keyword: &NGram, n: usize) -> Result<PeriodMap<Hits>> {
        self.period_models(keyword.arity())?;
        let Some((_, models)) = &self.models else {
            return Ok(PeriodMap::new());
        };
        let grouped = self.documents_by_period();
        let stop_words = &self.config.stop_words;
        models
            .iter()
            .map(|(period, model)| {
                let docs = grouped.get(period).map_or(&[][..], Vec::as_slice);
                let hits = model.top_n_for_keyword(docs, stop_words, keyword, n)?;
                Ok((*period, hits))
            })
            .collect()
    }

    /// Per-document keyword counts (or presence) over the ingested documents.
    pub fn raw_frequency(
        &self,
        keys: &[NGram],
        binary: bool,
    ) -> Result<IndexMap<String, DocumentFrequency>> {
        raw_frequency(&self.documents, keys, binary)
    }

    pub fn author_aggregates(&mut self, arity: usize) -> Result<PeriodMap<AuthorAggregates>> {
        let models = self.period_models(arity)?;
        Ok(models
            .iter()
            .map(|(period, model)| (*period, partition_by_author(*period, &model.corpus)))
            .collect())
    }

    /// One authors x keywords matrix per period. The weighting model is the
    /// period's document model, or one refitted on the author aggregates,
    /// depending on `author_scope`.
    pub fn score_matrices(&mut self, keywords: &[NGram]) -> Result<PeriodMap<ScoreMatrix>> {
        let arity = detect_arity(keywords)?;
        let scope = self.config.author_scope;
        let scheme = self.config.scheme;
        let models = self.period_models(arity)?;
        let mut out = IndexMap::with_capacity(models.len());
        for (period, pm) in models {
            let aggregates = partition_by_author(*period, &pm.corpus);
            let matrix = match scope {
                ModelScope::Documents => {
                    ScoreMatrix::build(&pm.corpus, &pm.model, &aggregates, keywords)?
                }
                ModelScope::Authors => {
                    // authors with no terms stay out of N
                    let bags = aggregates.bags().filter(|b| !b.is_empty());
                    let model = TFIDFModel::fit(bags, &pm.corpus.vocabulary, scheme);
                    ScoreMatrix::build(&pm.corpus, &model, &aggregates, keywords)?
                }
            };
            out.insert(*period, matrix);
        }
        Ok(out)
    }
}
