//! Storage contracts for the vectorization pipeline.
//!
//! Three stores sit behind traits so the pipeline can run against SQLite in
//! production and against fakes in tests:
//!
//! - [`WordVectorStore`]: token → (embedding, idf), one vocabulary per language
//! - [`DocumentStore`]: corpus documents, job flags and per-language results
//! - [`VectorIndex`]: nearest-neighbor index of finished document vectors
//!
//! All methods are synchronous. Callers in async contexts should use
//! `tokio::task::spawn_blocking`.

pub mod documents;
pub mod stats;
pub mod vector_index;
pub mod word_vectors;

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use documents::SqliteDocuments;
pub use vector_index::SqliteVecIndex;
pub use word_vectors::SqliteWordVectors;

/// Dimension of every word and document embedding.
pub const EMBEDDING_DIM: usize = 300;

/// Stored representation of one vocabulary token.
#[derive(Debug, Clone, PartialEq)]
pub struct WordVector {
    pub embedding: Vec<f32>,
    /// 0.0 until the first IDF run for the language has completed.
    pub idf: f64,
}

/// Corpus size and vocabulary coverage at the time of an IDF run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    pub lang: String,
    pub corpus_size: u64,
    pub vocabulary_size: u64,
    /// Vocabulary tokens seen in at least one qualifying document.
    pub observed_tokens: u64,
    pub computed_at: String,
}

pub trait WordVectorStore: Send + Sync {
    /// Every token tracked for `lang`.
    fn vocabulary(&self, lang: &str) -> Result<HashSet<String>>;

    /// Look up many tokens in one call. Unknown tokens are absent from the map.
    fn lookup(&self, lang: &str, tokens: &[String]) -> Result<HashMap<String, WordVector>>;

    /// Overwrite the idf of each `(token, idf)` pair; embeddings are untouched.
    fn update_idf(&self, lang: &str, batch: &[(String, f64)]) -> Result<()>;

    fn record_snapshot(&self, snapshot: &CorpusSnapshot) -> Result<()>;

    fn latest_snapshot(&self, lang: &str) -> Result<Option<CorpusSnapshot>>;
}

/// Vectorizer job state of one (document, language) pair.
///
/// Persisted as the boolean `document_vectors.vectorized`; a missing row is `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Vectorized,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Vectorized => "vectorized",
        }
    }
}

impl From<bool> for JobState {
    fn from(vectorized: bool) -> Self {
        if vectorized {
            Self::Vectorized
        } else {
            Self::Pending
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a document awaiting vectorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDocument {
    pub id: String,
    pub author: String,
    pub permlink: String,
    pub parent_permlink: Option<String>,
    pub tags: Vec<String>,
    pub created_at: String,
}

/// Result for one language of a [`DocumentUpdate`].
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageUpdate {
    pub lang: String,
    pub vector: Option<Vec<f32>>,
    pub known_token_ratio: Option<f64>,
}

/// Partial update marking a document vectorized in every listed language.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpdate {
    pub doc_id: String,
    pub languages: Vec<LanguageUpdate>,
}

/// Keyset cursor over the documents that qualify for an IDF run.
///
/// Pages are ordered by document id; the continuation is the last id handed
/// out, so the cursor can be resumed across calls.
#[derive(Debug, Clone)]
pub struct QualifyingCursor {
    pub lang: String,
    pub min_word_count: u32,
    pub page_size: usize,
    continuation: Option<String>,
    exhausted: bool,
}

impl QualifyingCursor {
    pub fn new(lang: impl Into<String>, min_word_count: u32, page_size: usize) -> Self {
        Self {
            lang: lang.into(),
            min_word_count,
            page_size: page_size.max(1),
            continuation: None,
            exhausted: false,
        }
    }

    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Record a fetched page. A short page ends the scan.
    pub fn advance(&mut self, page: &[String]) {
        if let Some(last) = page.last() {
            self.continuation = Some(last.clone());
        }
        if page.len() < self.page_size {
            self.exhausted = true;
        }
    }
}

pub trait DocumentStore: Send + Sync {
    /// Number of language-detected documents with at least one supported
    /// language not yet vectorized.
    fn count_pending(&self, languages: &[String]) -> Result<u64>;

    /// Up to `limit` pending documents, skipping the first `offset`.
    fn select_pending(
        &self,
        languages: &[String],
        limit: usize,
        offset: u64,
    ) -> Result<Vec<PendingDocument>>;

    /// Apply all updates as one bulk write. Each language row is overwritten in
    /// full, so replaying the same update is harmless.
    fn apply_updates(&self, updates: &[DocumentUpdate]) -> Result<()>;

    /// Next page of qualifying document ids; empty once the cursor is exhausted.
    fn next_qualifying(&self, cursor: &mut QualifyingCursor) -> Result<Vec<String>>;

    fn job_state(&self, doc_id: &str, lang: &str) -> Result<JobState>;
}

/// One finished document vector plus the metadata searched alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub doc_id: String,
    pub lang: String,
    pub author: String,
    pub permlink: String,
    pub parent_permlink: Option<String>,
    pub tags: Vec<String>,
    pub created_at: String,
    pub known_token_ratio: f64,
    pub vector: Vec<f32>,
}

pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite entries by id.
    fn upsert(&self, entries: &[IndexEntry]) -> Result<()>;
}
