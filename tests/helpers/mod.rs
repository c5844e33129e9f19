#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use docvec::db::{self, SharedConnection};
use docvec::error::SegmentError;
use docvec::pipeline::Heartbeat;
use docvec::segment::{Segmenter, Sentence};
use docvec::store::documents::{LanguageCount, NewDocument};
use docvec::store::{
    CorpusSnapshot, DocumentStore, DocumentUpdate, JobState, PendingDocument, QualifyingCursor,
    SqliteDocuments, SqliteWordVectors, WordVector, WordVectorStore, EMBEDDING_DIM,
};

/// Fresh in-memory database with schema and migrations applied.
pub fn test_db() -> SharedConnection {
    db::share(db::open_memory_database().unwrap())
}

/// Deterministic embedding with a single non-zero component at `index`.
pub fn one_hot(index: usize, value: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[index % EMBEDDING_DIM] = value;
    v
}

/// Load `tokens` as the vocabulary of `lang`, token `i` getting `one_hot(i, 1.0)`.
pub fn seed_vocabulary(db: &SharedConnection, lang: &str, tokens: &[&str]) -> SqliteWordVectors {
    let store = SqliteWordVectors::new(Arc::clone(db));
    let rows: Vec<(String, Vec<f32>)> = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| (t.to_string(), one_hot(i, 1.0)))
        .collect();
    store.insert_vectors(lang, &rows).unwrap();
    store
}

/// Insert a language-detected document with the given per-language word counts.
pub fn seed_document(db: &SharedConnection, id: &str, word_counts: &[(&str, u32)]) {
    let store = SqliteDocuments::new(Arc::clone(db));
    store
        .upsert_document(&NewDocument {
            id: id.to_string(),
            author: format!("author-{id}"),
            permlink: format!("post-{id}"),
            parent_permlink: None,
            tags: vec!["test".to_string()],
            created_at: "2024-03-01T12:00:00".to_string(),
            lang_detected: true,
            languages: word_counts
                .iter()
                .map(|(lang, word_count)| LanguageCount {
                    lang: lang.to_string(),
                    word_count: *word_count,
                })
                .collect(),
        })
        .unwrap();
}

pub fn langs(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

/// In-memory segmentation service with call counters and failure injection.
#[derive(Default)]
pub struct FakeSegmenter {
    documents: Mutex<HashMap<String, Vec<Sentence>>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, doc_id: &str, sentences: Vec<Sentence>) {
        self.documents
            .lock()
            .unwrap()
            .insert(doc_id.to_string(), sentences);
    }

    /// Single-sentence document in one language.
    pub fn add_text(&self, doc_id: &str, lang: &str, text: &str) {
        self.add(doc_id, vec![Sentence::new(text, &[lang])]);
    }

    pub fn fail(&self, doc_id: &str) {
        self.failing.lock().unwrap().insert(doc_id.to_string());
    }

    /// Make segmenting `doc_id` panic inside the calling task.
    pub fn panic_on(&self, doc_id: &str) {
        self.panicking.lock().unwrap().insert(doc_id.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn calls_for(&self, doc_id: &str) -> usize {
        self.calls.lock().unwrap().get(doc_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Segmenter for FakeSegmenter {
    async fn segment(
        &self,
        doc_id: &str,
        language: Option<&str>,
    ) -> Result<Vec<Sentence>, SegmentError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(doc_id.to_string())
            .or_default() += 1;

        let panics = self.panicking.lock().unwrap().contains(doc_id);
        if panics {
            panic!("segmenter crashed on {doc_id}");
        }

        if self.failing.lock().unwrap().contains(doc_id) {
            return Err(SegmentError::Status {
                doc_id: doc_id.to_string(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let sentences = self
            .documents
            .lock()
            .unwrap()
            .get(doc_id)
            .cloned()
            .unwrap_or_default();
        Ok(match language {
            Some(lang) => sentences
                .into_iter()
                .filter(|s| s.languages.iter().any(|l| l == lang))
                .collect(),
            None => sentences,
        })
    }
}

/// Document store whose bulk writes fail a set number of times first.
pub struct FlakyDocuments {
    pub inner: SqliteDocuments,
    failures_left: AtomicUsize,
    apply_calls: AtomicUsize,
}

impl FlakyDocuments {
    pub fn new(db: &SharedConnection, failures: usize) -> Self {
        Self {
            inner: SqliteDocuments::new(Arc::clone(db)),
            failures_left: AtomicUsize::new(failures),
            apply_calls: AtomicUsize::new(0),
        }
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }
}

impl DocumentStore for FlakyDocuments {
    fn count_pending(&self, languages: &[String]) -> Result<u64> {
        self.inner.count_pending(languages)
    }

    fn select_pending(
        &self,
        languages: &[String],
        limit: usize,
        offset: u64,
    ) -> Result<Vec<PendingDocument>> {
        self.inner.select_pending(languages, limit, offset)
    }

    fn apply_updates(&self, updates: &[DocumentUpdate]) -> Result<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("document store unavailable");
        }
        self.inner.apply_updates(updates)
    }

    fn next_qualifying(&self, cursor: &mut QualifyingCursor) -> Result<Vec<String>> {
        self.inner.next_qualifying(cursor)
    }

    fn job_state(&self, doc_id: &str, lang: &str) -> Result<JobState> {
        self.inner.job_state(doc_id, lang)
    }
}

/// Document store that is down: every call fails. Counts pending-count calls.
#[derive(Default)]
pub struct UnreachableDocuments {
    count_calls: AtomicUsize,
}

impl UnreachableDocuments {
    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }
}

impl DocumentStore for UnreachableDocuments {
    fn count_pending(&self, _languages: &[String]) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("document store unreachable")
    }

    fn select_pending(
        &self,
        _languages: &[String],
        _limit: usize,
        _offset: u64,
    ) -> Result<Vec<PendingDocument>> {
        anyhow::bail!("document store unreachable")
    }

    fn apply_updates(&self, _updates: &[DocumentUpdate]) -> Result<()> {
        anyhow::bail!("document store unreachable")
    }

    fn next_qualifying(&self, _cursor: &mut QualifyingCursor) -> Result<Vec<String>> {
        anyhow::bail!("document store unreachable")
    }

    fn job_state(&self, _doc_id: &str, _lang: &str) -> Result<JobState> {
        anyhow::bail!("document store unreachable")
    }
}

/// Word vector store that refuses every idf batch containing `poisoned`.
pub struct FlakyWordVectors {
    pub inner: SqliteWordVectors,
    poisoned: String,
    update_calls: AtomicUsize,
}

impl FlakyWordVectors {
    pub fn new(db: &SharedConnection, poisoned: &str) -> Self {
        Self {
            inner: SqliteWordVectors::new(Arc::clone(db)),
            poisoned: poisoned.to_string(),
            update_calls: AtomicUsize::new(0),
        }
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

impl WordVectorStore for FlakyWordVectors {
    fn vocabulary(&self, lang: &str) -> Result<HashSet<String>> {
        self.inner.vocabulary(lang)
    }

    fn lookup(&self, lang: &str, tokens: &[String]) -> Result<HashMap<String, WordVector>> {
        self.inner.lookup(lang, tokens)
    }

    fn update_idf(&self, lang: &str, batch: &[(String, f64)]) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if batch.iter().any(|(token, _)| *token == self.poisoned) {
            anyhow::bail!("write rejected");
        }
        self.inner.update_idf(lang, batch)
    }

    fn record_snapshot(&self, snapshot: &CorpusSnapshot) -> Result<()> {
        self.inner.record_snapshot(snapshot)
    }

    fn latest_snapshot(&self, lang: &str) -> Result<Option<CorpusSnapshot>> {
        self.inner.latest_snapshot(lang)
    }
}

/// Heartbeat that records every beat and optionally fails.
#[derive(Default)]
pub struct RecordingHeartbeat {
    pub beats: Mutex<Vec<(String, u64)>>,
    pub sent_at: Mutex<Vec<tokio::time::Instant>>,
    pub failing: bool,
}

impl RecordingHeartbeat {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.beats.lock().unwrap().len()
    }

    pub fn sent_at(&self) -> Vec<tokio::time::Instant> {
        self.sent_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl Heartbeat for RecordingHeartbeat {
    async fn beat(&self, status: &str, elapsed_ms: u64) -> Result<()> {
        self.beats
            .lock()
            .unwrap()
            .push((status.to_string(), elapsed_ms));
        self.sent_at.lock().unwrap().push(tokio::time::Instant::now());
        if self.failing {
            anyhow::bail!("monitor unreachable");
        }
        Ok(())
    }
}
