use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    document::AuthorKey,
    period::PeriodId,
    vectorizer::vocab::{BagOfWords, PeriodCorpus},
};

/// Summed bag of words of every author active in one period, ordered by author key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorAggregates {
    pub period: PeriodId,
    authors: IndexMap<AuthorKey, BagOfWords>,
}

impl AuthorAggregates {
    pub fn get(&self, author: &AuthorKey) -> Option<&BagOfWords> {
        self.authors.get(author)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AuthorKey, &BagOfWords)> {
        self.authors.iter()
    }

    pub fn authors(&self) -> impl Iterator<Item = &AuthorKey> {
        self.authors.keys()
    }

    pub fn bags(&self) -> impl Iterator<Item = &BagOfWords> {
        self.authors.values()
    }

    pub fn len(&self) -> usize {
        self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }
}

/// Groups a period corpus by author and sums each author's document vectors.
/// Authors whose documents all left the corpus get an empty bag; authors
/// without any document in the period do not appear.
pub fn partition_by_author(period: PeriodId, corpus: &PeriodCorpus) -> AuthorAggregates {
    let mut authors: IndexMap<AuthorKey, BagOfWords> = corpus
        .authors
        .iter()
        .map(|a| (a.clone(), BagOfWords::new()))
        .collect();
    for entry in &corpus.entries {
        authors
            .entry(entry.author.clone())
            .or_default()
            .merge(&entry.bow);
    }
    authors.sort_keys();
    AuthorAggregates { period, authors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::StopWords, document::Document, vectorizer::vocab::CorpusEntry};

    fn entry(doc: &str, author: &str, pairs: &[(u32, u32)]) -> CorpusEntry {
        CorpusEntry {
            doc_id: doc.to_string(),
            author: AuthorKey::normalize(author),
            bow: BagOfWords::from_pairs(pairs.iter().copied()),
        }
    }

    #[test]
    fn sums_counts_per_author() {
        let corpus = PeriodCorpus {
            arity: 1,
            entries: vec![
                entry("1", "Zola, Émile", &[(0, 1), (2, 2)]),
                entry("2", "Austen", &[(1, 1)]),
                entry("3", "zola  émile", &[(0, 3), (1, 1)]),
            ],
            ..PeriodCorpus::default()
        };
        let agg = partition_by_author(1850, &corpus);
        assert_eq!(agg.len(), 2);
        let keys: Vec<&str> = agg.authors().map(AuthorKey::as_str).collect();
        assert_eq!(keys, vec!["austen", "zola_émile"]);

        let zola = agg.get(&AuthorKey::normalize("Zola Émile")).unwrap();
        assert_eq!(zola.iter().collect::<Vec<_>>(), vec![(0, 4), (1, 1), (2, 2)]);
    }

    #[test]
    fn authors_without_terms_get_empty_bags() {
        let stop = StopWords::new(["the"]);
        let docs = [
            Document::from_text("1", "Dee", 1800, "the the"),
            Document::from_text("2", "Ann", 1800, "whale sea"),
            Document::from_text("3", "Eve", 1800, ""),
        ];
        let refs: Vec<&Document> = docs.iter().collect();
        let corpus = PeriodCorpus::build(&refs, 1, &stop);
        assert_eq!(corpus.len(), 1);

        let agg = partition_by_author(1800, &corpus);
        let keys: Vec<&str> = agg.authors().map(AuthorKey::as_str).collect();
        assert_eq!(keys, vec!["ann", "dee", "eve"]);
        assert!(agg.get(&AuthorKey::normalize("Dee")).unwrap().is_empty());
        assert_eq!(agg.get(&AuthorKey::normalize("Ann")).unwrap().total(), 2);
    }

    #[test]
    fn empty_corpus_has_no_authors() {
        let agg = partition_by_author(1800, &PeriodCorpus::default());
        assert!(agg.is_empty());
        assert_eq!(agg.period, 1800);
    }
}
