use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::StopWords,
    document::{detect_arity, join_tokens, ngram_windows, Document, NGram},
    error::{AnalysisError, Result},
    persist,
    period::{PeriodId, PeriodIndex, PeriodMap},
};

/// Frequency Table
/// 期間ごとの n-gram 出現頻度
/// Holds, for one period, the number of contributing documents, the number of
/// counted n-grams and the per-document occurrence counts of every n-gram.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyTable {
    #[serde(rename = "NUM_DOCS")]
    doc_count: u64,
    #[serde(rename = "TOTAL_WORDS")]
    total_tokens: u64,
    /// joined n-gram -> one count per document that contains it, first-seen order
    #[serde(rename = "FDIST")]
    term_counts: IndexMap<Box<str>, Vec<u32>>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one document in.
    /// An n-gram whose joined form is a stop word is not counted.
    pub fn accumulate(&mut self, tokens: &[String], arity: usize, stop_words: &StopWords) {
        let mut local: IndexMap<String, u32> = IndexMap::new();
        let mut kept = 0u64;
        for window in ngram_windows(tokens, arity) {
            let key = join_tokens(window);
            if stop_words.contains(&key) {
                continue;
            }
            *local.entry(key).or_insert(0) += 1;
            kept += 1;
        }
        for (key, count) in local {
            self.term_counts
                .entry(key.into_boxed_str())
                .or_default()
                .push(count);
        }
        self.doc_count += 1;
        self.total_tokens += kept;
    }

    pub fn doc_count(&self) -> u64 {
        self.doc_count
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    /// Total occurrences of a joined n-gram.
    pub fn term_count(&self, key: &str) -> u64 {
        self.term_counts
            .get(key)
            .map_or(0, |counts| counts.iter().map(|c| *c as u64).sum())
    }

    /// One entry per document containing the n-gram.
    pub fn document_counts(&self, key: &str) -> Option<&[u32]> {
        self.term_counts.get(key).map(Vec::as_slice)
    }

    /// Most frequent n-grams with their share of `total_tokens` in percent.
    /// Ties keep first-seen order.
    pub fn top_n(&self, n: usize) -> Vec<(String, f64)> {
        if self.total_tokens == 0 || n == 0 {
            return Vec::new();
        }
        let mut totals: Vec<(&str, u64)> = self
            .term_counts
            .iter()
            .map(|(k, c)| (k.as_ref(), c.iter().map(|x| *x as u64).sum()))
            .collect();
        // stable: equal counts stay in insertion order
        totals.sort_by(|a, b| b.1.cmp(&a.1));
        let total = self.total_tokens as f64;
        totals
            .into_iter()
            .take(n)
            .map(|(k, c)| (k.to_string(), 100.0 * c as f64 / total))
            .collect()
    }
}

/// Keyword counts of one document over its raw n-grams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFrequency {
    pub year: i32,
    /// n-grams in the document; not reported in binary mode
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text_length: Option<u64>,
    pub counts: IndexMap<NGram, u32>,
}

/// Per-document keyword counts, or 0/1 presence when `binary` is set.
/// Stop words are not applied. Keyed by document id, in the order given.
pub fn raw_frequency(
    documents: &[Document],
    keys: &[NGram],
    binary: bool,
) -> Result<IndexMap<String, DocumentFrequency>> {
    let arity = detect_arity(keys)?;
    Ok(documents
        .iter()
        .map(|doc| {
            let mut counts: IndexMap<NGram, u32> = keys.iter().map(|k| (k.clone(), 0)).collect();
            let mut length = 0u64;
            for window in doc.ngrams(arity) {
                length += 1;
                if let Some(pos) = keys.iter().position(|k| k.tokens() == window) {
                    counts[pos] += 1;
                }
            }
            if binary {
                counts.values_mut().for_each(|c| *c = (*c).min(1));
            }
            let entry = DocumentFrequency {
                year: doc.year,
                text_length: (!binary).then_some(length),
                counts,
            };
            (doc.id.clone(), entry)
        })
        .collect())
}

/// Result of one frequency statistic for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyStats {
    pub values: IndexMap<NGram, f64>,
    /// the statistic over all requested keys together
    pub total: f64,
    pub doc_count: u64,
}

impl KeyStats {
    pub fn get(&self, key: &NGram) -> Option<f64> {
        self.values.get(key).copied()
    }
}

/// Frequency tables of every period for one n-gram arity.
///
/// # Serialization
/// Snapshot layout keeps the field names `__N__`, `NUM_DOCS`, `TOTAL_WORDS`, `FDIST`,
/// plus the period boundaries, so a saved record can be queried without the raw documents.
/// Loading checks every table key against the boundaries; periods missing
/// from the snapshot come back as empty tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFrequencyRecord")]
pub struct FrequencyRecord {
    #[serde(rename = "__N__")]
    arity: usize,
    periods: PeriodIndex,
    tables: PeriodMap<FrequencyTable>,
}

#[derive(Deserialize)]
struct RawFrequencyRecord {
    #[serde(rename = "__N__")]
    arity: usize,
    periods: PeriodIndex,
    tables: PeriodMap<FrequencyTable>,
}

impl TryFrom<RawFrequencyRecord> for FrequencyRecord {
    type Error = AnalysisError;

    fn try_from(raw: RawFrequencyRecord) -> Result<Self> {
        if raw.arity == 0 {
            return Err(AnalysisError::ZeroArity);
        }
        if let Some(foreign) = raw.tables.keys().find(|p| !raw.periods.contains(**p)) {
            return Err(AnalysisError::UnknownPeriod(*foreign));
        }
        let mut loaded = raw.tables;
        let tables = raw
            .periods
            .map_with(|p| loaded.swap_remove(&p).unwrap_or_default());
        Ok(Self {
            arity: raw.arity,
            periods: raw.periods,
            tables,
        })
    }
}

impl FrequencyRecord {
    /// Single accumulation pass over `documents`, which must already be in canonical order.
    /// Out-of-range and malformed documents are skipped with a warning.
    pub fn build(
        periods: &PeriodIndex,
        documents: &[Document],
        arity: usize,
        stop_words: &StopWords,
    ) -> Result<Self> {
        if arity == 0 {
            return Err(AnalysisError::ZeroArity);
        }
        let mut tables = periods.map_with(|_| FrequencyTable::new());
        for doc in documents {
            let period = match doc.validate().and_then(|_| periods.assign(doc.year)) {
                Ok(p) => p,
                Err(e) => {
                    warn!(doc = %doc.id, error = %e, "skipping document");
                    continue;
                }
            };
            if let Some(table) = tables.get_mut(&period) {
                table.accumulate(&doc.tokens, arity, stop_words);
            }
        }
        info!(arity, periods = tables.len(), "frequency tables built");
        for (period, table) in &tables {
            debug!(period, docs = table.doc_count, tokens = table.total_tokens, "frequency table");
        }
        Ok(Self {
            arity,
            periods: periods.clone(),
            tables,
        })
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn periods(&self) -> &PeriodIndex {
        &self.periods
    }

    pub fn table(&self, period: PeriodId) -> Option<&FrequencyTable> {
        self.tables.get(&period)
    }

    pub fn tables(&self) -> &PeriodMap<FrequencyTable> {
        &self.tables
    }

    fn check_keys(&self, keys: &[NGram]) -> Result<()> {
        let found = detect_arity(keys)?;
        if found != self.arity {
            return Err(AnalysisError::ArityMismatch {
                expected: self.arity,
                found,
            });
        }
        Ok(())
    }

    /// Shared shape of the three key statistics: periods without counted
    /// n-grams are omitted.
    fn per_period<F>(&self, keys: &[NGram], stat: F) -> Result<PeriodMap<KeyStats>>
    where
        F: Fn(&FrequencyTable, &[(NGram, String)]) -> (Vec<f64>, f64),
    {
        self.check_keys(keys)?;
        let joined: Vec<(NGram, String)> = keys.iter().map(|k| (k.clone(), k.joined())).collect();
        Ok(self
            .tables
            .iter()
            .filter(|(_, table)| table.total_tokens > 0)
            .map(|(period, table)| {
                let (values, total) = stat(table, &joined);
                let values = joined.iter().map(|(k, _)| k.clone()).zip(values).collect();
                (
                    *period,
                    KeyStats {
                        values,
                        total,
                        doc_count: table.doc_count,
                    },
                )
            })
            .collect())
    }

    /// count / total_tokens per key and for all keys together.
    pub fn global_frequency(&self, keys: &[NGram]) -> Result<PeriodMap<KeyStats>> {
        self.per_period(keys, |table, keys| {
            let total_tokens = table.total_tokens as f64;
            let counts: Vec<f64> = keys.iter().map(|(_, j)| table.term_count(j) as f64).collect();
            let sum: f64 = counts.iter().sum();
            (counts.into_iter().map(|c| c / total_tokens).collect(), sum / total_tokens)
        })
    }

    /// count / doc_count per key and for all keys together.
    pub fn average_frequency(&self, keys: &[NGram]) -> Result<PeriodMap<KeyStats>> {
        self.per_period(keys, |table, keys| {
            let docs = table.doc_count as f64;
            let counts: Vec<f64> = keys.iter().map(|(_, j)| table.term_count(j) as f64).collect();
            let sum: f64 = counts.iter().sum();
            (counts.into_iter().map(|c| c / docs).collect(), sum / docs)
        })
    }

    /// Spread of per-document counts around the per-document average.
    ///
    /// For a key with counts `c_1..c_m` in the `m` documents containing it:
    /// `avg = Σc / doc_count`, `var = Σ(c_i - avg)² / m`. The total pools every
    /// deviation of every key. Keys that never occur report `0.0`.
    pub fn variance(&self, keys: &[NGram]) -> Result<PeriodMap<KeyStats>> {
        self.per_period(keys, |table, keys| {
            let docs = table.doc_count as f64;
            let mut pooled_sq = 0.0;
            let mut pooled_n = 0usize;
            let values = keys
                .iter()
                .map(|(_, j)| match table.document_counts(j) {
                    Some(counts) if !counts.is_empty() => {
                        let avg = counts.iter().map(|c| *c as f64).sum::<f64>() / docs;
                        let sq: f64 = counts.iter().map(|c| (*c as f64 - avg).powi(2)).sum();
                        pooled_sq += sq;
                        pooled_n += counts.len();
                        sq / counts.len() as f64
                    }
                    _ => 0.0,
                })
                .collect();
            let total = if pooled_n == 0 { 0.0 } else { pooled_sq / pooled_n as f64 };
            (values, total)
        })
    }

    /// `top_n` of every period; periods with nothing counted yield an empty list.
    pub fn top_n(&self, n: usize) -> PeriodMap<Vec<(String, f64)>> {
        self.tables
            .iter()
            .map(|(period, table)| (*period, table.top_n(n)))
            .collect()
    }

    /// Saves as JSON, or CBOR when the extension is `.cbor`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        persist::write_snapshot(self, path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        persist::read_snapshot(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, year: i32, text: &str) -> Document {
        Document::from_text(id, "anon", year, text)
    }

    fn keys(k: &[&str]) -> Vec<NGram> {
        NGram::parse_list(k).unwrap()
    }

    fn record(docs: &[Document], arity: usize) -> FrequencyRecord {
        let periods = PeriodIndex::new(vec![1800, 1850, 1900]).unwrap();
        FrequencyRecord::build(&periods, docs, arity, &StopWords::default()).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn documents_in_separate_periods() {
        let docs = vec![doc("A", 1820, "x x y"), doc("B", 1860, "y")];
        let rec = record(&docs, 1);
        let x = keys(&["x"]);

        let global = rec.global_frequency(&x).unwrap();
        assert!(close(global[&1800].get(&x[0]).unwrap(), 2.0 / 3.0));
        assert!(close(global[&1850].get(&x[0]).unwrap(), 0.0));

        let avg = rec.average_frequency(&x).unwrap();
        assert!(close(avg[&1800].get(&x[0]).unwrap(), 2.0));
    }

    #[test]
    fn documents_in_the_same_period() {
        let docs = vec![doc("A", 1820, "x x y"), doc("B", 1830, "y")];
        let rec = record(&docs, 1);
        let x = keys(&["x"]);

        let global = rec.global_frequency(&x).unwrap();
        assert!(close(global[&1800].get(&x[0]).unwrap(), 2.0 / 4.0));
        assert!(close(global[&1800].total, 0.5));
        assert_eq!(global[&1800].doc_count, 2);
        // nothing counted in 1850
        assert!(!global.contains_key(&1850));

        let avg = rec.average_frequency(&x).unwrap();
        assert!(close(avg[&1800].get(&x[0]).unwrap(), 1.0));
    }

    #[test]
    fn variance_of_per_document_counts() {
        // x: counts 2 (A) and 1 (C); doc_count 3 -> avg 1
        let docs = vec![doc("A", 1820, "x x y"), doc("B", 1830, "y"), doc("C", 1840, "x z")];
        let rec = record(&docs, 1);
        let k = keys(&["x", "y", "q"]);
        let var = rec.variance(&k).unwrap();
        let stats = &var[&1800];
        assert!(close(stats.get(&k[0]).unwrap(), 0.5));
        // y: counts 1, 1; avg 2/3
        let dy = (1.0f64 - 2.0 / 3.0).powi(2);
        assert!(close(stats.get(&k[1]).unwrap(), dy));
        assert!(close(stats.get(&k[2]).unwrap(), 0.0));
        let pooled = (1.0 + 0.0 + 2.0 * dy) / 4.0;
        assert!(close(stats.total, pooled));
    }

    #[test]
    fn global_frequency_is_conserved() {
        let docs = vec![
            doc("A", 1820, "a b c a b a"),
            doc("B", 1830, "c c d"),
            doc("C", 1860, "a"),
        ];
        let rec = record(&docs, 1);
        let all = keys(&["a", "b", "c", "d"]);
        let global = rec.global_frequency(&all).unwrap();
        for stats in global.values() {
            let sum: f64 = stats.values.values().sum();
            assert!(sum <= 1.0 + 1e-12);
            assert!(close(sum, stats.total));
        }
        assert!(close(global[&1800].total, 1.0));
    }

    #[test]
    fn average_and_global_describe_the_same_counts() {
        let docs = vec![
            doc("A", 1820, "a b c a b a"),
            doc("B", 1830, "c c d"),
            doc("C", 1840, ""),
            doc("D", 1860, "a d d"),
        ];
        let rec = record(&docs, 1);
        let all = keys(&["a", "b", "c", "d", "zz"]);
        let global = rec.global_frequency(&all).unwrap();
        let avg = rec.average_frequency(&all).unwrap();
        for (period, g) in &global {
            let table = rec.table(*period).unwrap();
            let a = &avg[period];
            for key in &all {
                let lhs = a.get(key).unwrap() * table.doc_count() as f64;
                let rhs = g.get(key).unwrap() * table.total_tokens() as f64;
                assert!(close(lhs, rhs), "{period} {key}");
            }
            assert!(close(
                a.total * table.doc_count() as f64,
                g.total * table.total_tokens() as f64
            ));
        }
    }

    #[test]
    fn snapshot_with_a_foreign_period_is_rejected() {
        let rec = record(&[doc("A", 1820, "x")], 1);
        let mut value = serde_json::to_value(&rec).unwrap();
        {
            let tables = value["tables"].as_object_mut().unwrap();
            let table = tables.remove("1850").unwrap();
            tables.insert("1700".to_string(), table);
        }
        let err = serde_json::from_value::<FrequencyRecord>(value.clone()).unwrap_err();
        assert!(err.to_string().contains("1700"), "{err}");

        value["tables"].as_object_mut().unwrap().remove("1700");
        let loaded: FrequencyRecord = serde_json::from_value(value).unwrap();
        assert_eq!(loaded.tables().keys().copied().collect::<Vec<_>>(), vec![1800, 1850]);
        assert_eq!(loaded.table(1850).unwrap().doc_count(), 0);
        assert_eq!(loaded.table(1800), rec.table(1800));
    }

    #[test]
    fn raw_counts_per_document() {
        let docs = vec![doc("A", 1820, "the whale the sea"), doc("B", 1700, "sea")];
        let k = keys(&["the", "sea", "ship"]);
        let counts = raw_frequency(&docs, &k, false).unwrap();
        assert_eq!(counts["A"].text_length, Some(4));
        assert_eq!(counts["A"].counts.values().copied().collect::<Vec<_>>(), vec![2, 1, 0]);
        assert_eq!(counts["B"].year, 1700);

        let presence = raw_frequency(&docs, &k, true).unwrap();
        assert_eq!(presence["A"].text_length, None);
        assert_eq!(presence["A"].counts.values().copied().collect::<Vec<_>>(), vec![1, 1, 0]);

        let bigrams = raw_frequency(&docs, &keys(&["the whale"]), false).unwrap();
        assert_eq!(bigrams["A"].text_length, Some(3));
        assert_eq!(bigrams["A"].counts[0], 1);
    }

    #[test]
    fn bigram_counts_skip_stop_grams() {
        let periods = PeriodIndex::new(vec![1800, 1900]).unwrap();
        let docs = vec![doc("A", 1820, "a b a b")];
        let stop = StopWords::new(["b a"]);
        let rec = FrequencyRecord::build(&periods, &docs, 2, &stop).unwrap();
        let table = rec.table(1800).unwrap();
        assert_eq!(table.total_tokens(), 2);
        assert_eq!(table.term_count("a b"), 2);
        assert_eq!(table.term_count("b a"), 0);
    }

    #[test]
    fn arity_is_checked_before_work() {
        let rec = record(&[doc("A", 1820, "x y")], 1);
        assert!(matches!(
            rec.global_frequency(&keys(&["x y"])),
            Err(AnalysisError::ArityMismatch { expected: 1, found: 2 })
        ));
        assert!(matches!(rec.variance(&[]), Err(AnalysisError::EmptyKeywords)));
    }

    #[test]
    fn out_of_range_documents_are_skipped() {
        let docs = vec![doc("A", 1700, "x"), doc("", 1820, "x"), doc("B", 1820, "y")];
        let rec = record(&docs, 1);
        assert_eq!(rec.table(1800).unwrap().doc_count(), 1);
        assert_eq!(rec.table(1800).unwrap().term_count("x"), 0);
    }

    #[test]
    fn top_n_orders_by_count_then_first_seen() {
        let docs = vec![doc("A", 1820, "b a c a b d")];
        let rec = record(&docs, 1);
        let top = rec.top_n(3);
        let words: Vec<&str> = top[&1800].iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(words, vec!["b", "a", "c"]);
        assert!(close(top[&1800][0].1, 100.0 * 2.0 / 6.0));
        assert!(top[&1850].is_empty());
        assert_eq!(rec.top_n(10)[&1800].len(), 4);
    }
}
