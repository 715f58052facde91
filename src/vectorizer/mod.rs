pub mod author;
pub mod compute;
pub mod frequency;
pub mod score;
pub mod tfidf;
pub mod vocab;

pub use author::{partition_by_author, AuthorAggregates};
pub use frequency::{raw_frequency, DocumentFrequency, FrequencyRecord, FrequencyTable, KeyStats};
pub use score::{ActiveMatrix, ScoreMatrix};
pub use tfidf::{HitEntry, Hits, PeriodModel, TFIDFEngine, TFIDFModel, WeightingScheme};
pub use vocab::{BagOfWords, PeriodCorpus, TermId, Vocabulary};
