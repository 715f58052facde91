use ahash::{AHashMap, RandomState};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::{
    config::StopWords,
    document::{join_tokens, ngram_windows, AuthorKey, Document},
    utils::sort::sort_and_fold_counts,
};

pub type TermId = u32;

/// Sparse term counts of one document (or one author aggregate).
/// Stored column-wise, sorted by ascending term id, no zero counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagOfWords {
    ids: Vec<TermId>,
    counts: Vec<u32>,
}

impl BagOfWords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bag from unordered pairs; duplicate ids are summed.
    pub fn from_pairs<I: IntoIterator<Item = (TermId, u32)>>(pairs: I) -> Self {
        let (mut ids, mut counts): (Vec<TermId>, Vec<u32>) = pairs.into_iter().unzip();
        sort_and_fold_counts(&mut ids, &mut counts);
        Self { ids, counts }
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (TermId, u32)> + '_ {
        self.ids.iter().copied().zip(self.counts.iter().copied())
    }

    pub fn count(&self, id: TermId) -> u32 {
        self.ids.binary_search(&id).map_or(0, |pos| self.counts[pos])
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| *c as u64).sum()
    }

    /// self += other, per term id
    pub fn merge(&mut self, other: &BagOfWords) {
        let mut ids = Vec::with_capacity(self.ids.len() + other.ids.len());
        let mut counts = Vec::with_capacity(ids.capacity());
        let (mut a, mut b) = (self.iter().peekable(), other.iter().peekable());
        loop {
            let next = match (a.peek(), b.peek()) {
                (Some(&(ia, ca)), Some(&(ib, cb))) => match ia.cmp(&ib) {
                    std::cmp::Ordering::Equal => {
                        a.next();
                        b.next();
                        (ia, ca + cb)
                    }
                    std::cmp::Ordering::Less => {
                        a.next();
                        (ia, ca)
                    }
                    std::cmp::Ordering::Greater => {
                        b.next();
                        (ib, cb)
                    }
                },
                (Some(&p), None) => {
                    a.next();
                    p
                }
                (None, Some(&p)) => {
                    b.next();
                    p
                }
                (None, None) => break,
            };
            ids.push(next.0);
            counts.push(next.1);
        }
        drop((a, b));
        self.ids = ids;
        self.counts = counts;
    }
}

/// Vocabulary
/// term <-> id の全単射
/// ids are handed out in first-occurrence order and never reassigned.
/// Also keeps the document-frequency bookkeeping of every term.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    terms: IndexSet<Box<str>, RandomState>,
    doc_freq: Vec<u64>,
    doc_num: u64,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 文書を追加してBoWを返す
    /// Unseen terms get the next free id. Every distinct term's document
    /// frequency is incremented once. Empty input changes nothing.
    pub fn add<T: AsRef<str>>(&mut self, terms: &[T]) -> BagOfWords {
        if terms.is_empty() {
            return BagOfWords::new();
        }
        let mut local: AHashMap<TermId, u32> = AHashMap::with_capacity(terms.len());
        for term in terms {
            let term = term.as_ref();
            let id = match self.terms.get_index_of(term) {
                Some(id) => id as TermId,
                None => {
                    let (id, _) = self.terms.insert_full(term.into());
                    self.doc_freq.push(0);
                    id as TermId
                }
            };
            *local.entry(id).or_insert(0) += 1;
        }
        for id in local.keys() {
            self.doc_freq[*id as usize] += 1;
        }
        self.doc_num += 1;
        BagOfWords::from_pairs(local)
    }

    /// Read-only projection; unknown terms are dropped.
    pub fn doc2bow<T: AsRef<str>>(&self, terms: &[T]) -> BagOfWords {
        BagOfWords::from_pairs(
            terms
                .iter()
                .filter_map(|t| self.id(t.as_ref()))
                .map(|id| (id, 1)),
        )
    }

    #[inline]
    pub fn id(&self, term: &str) -> Option<TermId> {
        self.terms.get_index_of(term).map(|i| i as TermId)
    }

    #[inline]
    pub fn term(&self, id: TermId) -> Option<&str> {
        self.terms.get_index(id as usize).map(|t| t.as_ref())
    }

    pub fn doc_freq(&self, id: TermId) -> u64 {
        self.doc_freq.get(id as usize).copied().unwrap_or(0)
    }

    /// Number of documents added.
    pub fn doc_num(&self) -> u64 {
        self.doc_num
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (TermId, &str)> {
        self.terms.iter().enumerate().map(|(i, t)| (i as TermId, t.as_ref()))
    }
}

/// Weighting terms of a token stream: stop tokens removed first, then
/// grouped into n-grams of `arity` joined by a space.
pub fn weighting_terms(tokens: &[String], arity: usize, stop_words: &StopWords) -> Vec<String> {
    let kept: Vec<&str> = tokens
        .iter()
        .map(String::as_str)
        .filter(|t| !stop_words.contains(t))
        .collect();
    if arity == 1 {
        return kept.into_iter().map(str::to_string).collect();
    }
    ngram_windows(&kept, arity).map(join_tokens).collect()
}

/// One fitted document of a period corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub doc_id: String,
    pub author: AuthorKey,
    pub bow: BagOfWords,
}

/// Vocabulary and bags of words of one period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeriodCorpus {
    pub arity: usize,
    pub vocabulary: Vocabulary,
    pub entries: Vec<CorpusEntry>,
    /// Every author with a document in the period, including documents that
    /// left the corpus. Sorted, no duplicates.
    #[serde(default)]
    pub authors: Vec<AuthorKey>,
}

impl PeriodCorpus {
    /// Documents with no surviving terms are left out of the corpus,
    /// their authors are still listed in `authors`.
    pub fn build(documents: &[&Document], arity: usize, stop_words: &StopWords) -> Self {
        let mut vocabulary = Vocabulary::new();
        let mut entries = Vec::with_capacity(documents.len());
        let mut authors: Vec<AuthorKey> = documents.iter().map(|d| d.author_key()).collect();
        authors.sort_unstable();
        authors.dedup();
        for doc in documents {
            let terms = weighting_terms(&doc.tokens, arity, stop_words);
            if terms.is_empty() {
                continue;
            }
            let bow = vocabulary.add(&terms);
            entries.push(CorpusEntry {
                doc_id: doc.id.clone(),
                author: doc.author_key(),
                bow,
            });
        }
        Self {
            arity,
            vocabulary,
            entries,
            authors,
        }
    }

    pub fn bags(&self) -> impl Iterator<Item = &BagOfWords> {
        self.entries.iter().map(|e| &e.bow)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
