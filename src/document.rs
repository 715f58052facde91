use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AnalysisError, Result};

/// A dated, authored, already tokenized text.
/// Immutable once handed to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub author: String,
    pub year: i32,
    pub tokens: Vec<String>,
}

impl Document {
    pub fn new<S: Into<String>>(id: S, author: S, year: i32, tokens: Vec<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            year,
            tokens,
        }
    }

    /// Convenience constructor splitting `text` on whitespace.
    pub fn from_text(id: &str, author: &str, year: i32, text: &str) -> Self {
        Self::new(
            id.to_string(),
            author.to_string(),
            year,
            text.split_whitespace().map(str::to_string).collect(),
        )
    }

    pub fn author_key(&self) -> AuthorKey {
        AuthorKey::normalize(&self.author)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AnalysisError::malformed(&self.id, "empty document id"));
        }
        Ok(())
    }

    /// n-gram windows over the raw token stream
    pub fn ngrams(&self, arity: usize) -> impl Iterator<Item = &[String]> {
        ngram_windows(&self.tokens, arity)
    }
}

/// Sliding windows of `arity` tokens; nothing when the input is shorter.
pub fn ngram_windows<T>(tokens: &[T], arity: usize) -> impl Iterator<Item = &[T]> {
    // windows(0) panics
    tokens.windows(arity.max(1)).filter(move |_| arity > 0)
}

/// Joined form of an n-gram, tokens separated by a single space.
pub fn join_tokens<T: AsRef<str>>(tokens: &[T]) -> String {
    let mut out = String::with_capacity(tokens.iter().map(|t| t.as_ref().len() + 1).sum());
    for (i, t) in tokens.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(t.as_ref());
    }
    out
}

/// Canonical author identity: lowercase, every run of non-alphanumeric
/// characters collapsed into a single `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorKey(String);

impl AuthorKey {
    pub fn normalize(raw: &str) -> Self {
        let mut key = String::with_capacity(raw.len());
        let mut in_gap = false;
        for c in raw.chars().flat_map(char::to_lowercase) {
            if c.is_alphanumeric() {
                key.push(c);
                in_gap = false;
            } else if !in_gap {
                key.push('_');
                in_gap = true;
            }
        }
        AuthorKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AuthorKey {
    fn from(value: &str) -> Self {
        AuthorKey::normalize(value)
    }
}

/// A sequence of one or more tokens used as a query key.
/// Displayed and serialized as its tokens joined by a single space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NGram(Vec<String>);

impl NGram {
    pub fn new(tokens: Vec<String>) -> Result<Self> {
        if tokens.is_empty() || tokens.iter().any(|t| t.is_empty() || t.contains(char::is_whitespace)) {
            return Err(AnalysisError::InvalidNGram(join_tokens(&tokens)));
        }
        Ok(NGram(tokens))
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn joined(&self) -> String {
        join_tokens(&self.0)
    }

    /// Parses every entry, then checks they share one arity.
    pub fn parse_list<S: AsRef<str>>(keys: &[S]) -> Result<Vec<NGram>> {
        let parsed = keys
            .iter()
            .map(|k| k.as_ref().parse::<NGram>())
            .collect::<Result<Vec<_>>>()?;
        detect_arity(&parsed)?;
        Ok(parsed)
    }
}

impl FromStr for NGram {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        NGram::new(s.split_whitespace().map(str::to_string).collect())
            .map_err(|_| AnalysisError::InvalidNGram(s.to_string()))
    }
}

impl fmt::Display for NGram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl Serialize for NGram {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NGram {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Common arity of a keyword list.
/// Rejects empty lists and lists mixing arities before any work is done.
pub fn detect_arity(keys: &[NGram]) -> Result<usize> {
    let first = keys.first().ok_or(AnalysisError::EmptyKeywords)?.arity();
    if keys.iter().any(|k| k.arity() != first) {
        let mut arities: Vec<usize> = keys.iter().map(NGram::arity).collect();
        arities.sort_unstable();
        arities.dedup();
        return Err(AnalysisError::MixedArity(arities));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_key_collapses_separator_runs() {
        assert_eq!(AuthorKey::normalize("Smith, John").as_str(), "smith_john");
        assert_eq!(AuthorKey::normalize("  Dr. J.  Smith!").as_str(), "_dr_j_smith_");
        assert_eq!(AuthorKey::normalize("a__b").as_str(), "a_b");
        assert_eq!(AuthorKey::normalize("").as_str(), "");
        assert_eq!(AuthorKey::normalize("Goethe"), AuthorKey::normalize("GOETHE"));
        assert_eq!(AuthorKey::normalize("Müller").as_str(), "müller");
    }

    #[test]
    fn ngram_parse_and_display() {
        let g: NGram = "hello   world".parse().unwrap();
        assert_eq!(g.arity(), 2);
        assert_eq!(g.to_string(), "hello world");
        assert!("".parse::<NGram>().is_err());
        assert!("   ".parse::<NGram>().is_err());
    }

    #[test]
    fn ngram_serializes_as_joined_string() {
        let g: NGram = "x y".parse().unwrap();
        assert_eq!(serde_json::to_string(&g).unwrap(), "\"x y\"");
        let back: NGram = serde_json::from_str("\"x y\"").unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn arity_detection() {
        let keys = NGram::parse_list(&["a b", "c d"]).unwrap();
        assert_eq!(detect_arity(&keys).unwrap(), 2);

        assert!(matches!(detect_arity(&[]), Err(AnalysisError::EmptyKeywords)));
        match NGram::parse_list(&["a", "b c", "d"]) {
            Err(AnalysisError::MixedArity(a)) => assert_eq!(a, vec![1, 2]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn windows_over_tokens() {
        let doc = Document::from_text("d", "a", 1800, "a b c");
        let bigrams: Vec<String> = doc.ngrams(2).map(join_tokens).collect();
        assert_eq!(bigrams, vec!["a b", "b c"]);
        assert_eq!(doc.ngrams(4).count(), 0);
        assert_eq!(doc.ngrams(0).count(), 0);
    }

    #[test]
    fn empty_id_is_malformed() {
        let doc = Document::from_text(" ", "a", 1800, "x");
        assert!(matches!(doc.validate(), Err(AnalysisError::MalformedDocument { .. })));
        assert!(Document::from_text("ok", "a", 1800, "").validate().is_ok());
    }
}
