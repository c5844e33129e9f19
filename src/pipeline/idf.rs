//! Corpus-wide inverse document frequency.
//!
//! One run scans every qualifying document of a language, counts for each
//! vocabulary token the number of documents containing it, and overwrites the
//! idf of every vocabulary token with `log10(N / df)`. Tokens never seen get
//! the smallest idf of the run.
//!
//! Scan tasks never share a counter: each returns the distinct known tokens
//! of its document and the orchestrating loop merges them. Nothing is written
//! until the scan has completed without error.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::with_retries;
use crate::config::IdfConfig;
use crate::error::IdfError;
use crate::segment::{join_by_language, Segmenter};
use crate::store::{CorpusSnapshot, DocumentStore, QualifyingCursor, WordVectorStore};
use crate::text::TokenizerSet;

#[derive(Debug, Clone, Serialize)]
pub struct IdfReport {
    pub lang: String,
    pub corpus_size: u64,
    pub vocabulary_size: u64,
    /// Vocabulary tokens found in at least one document.
    pub observed_tokens: u64,
    pub min_idf: f64,
    pub batches_written: usize,
    pub batches_failed: usize,
    pub elapsed_ms: u64,
}

/// Idf of every vocabulary token, sorted by token.
///
/// `document_frequency` entries outside the vocabulary are ignored. When no
/// vocabulary token has a positive frequency every token gets 0.0.
pub fn compute_idf(
    vocabulary: &HashSet<String>,
    document_frequency: &HashMap<String, u64>,
    corpus_size: u64,
) -> Vec<(String, f64)> {
    let n = corpus_size as f64;
    let observed: BTreeMap<&str, f64> = vocabulary
        .iter()
        .filter_map(|token| {
            let df = *document_frequency.get(token)?;
            (df > 0).then(|| (token.as_str(), (n / df as f64).log10()))
        })
        .collect();

    let floor = observed.values().copied().reduce(f64::min).unwrap_or(0.0);

    let mut scores: Vec<(String, f64)> = vocabulary
        .iter()
        .map(|token| {
            let idf = observed.get(token.as_str()).copied().unwrap_or(floor);
            (token.clone(), idf)
        })
        .collect();
    scores.sort_by(|a, b| a.0.cmp(&b.0));
    scores
}

pub struct IdfStatsBuilder {
    documents: Arc<dyn DocumentStore>,
    word_vectors: Arc<dyn WordVectorStore>,
    segmenter: Arc<dyn Segmenter>,
    tokenizers: Arc<TokenizerSet>,
    config: IdfConfig,
}

impl IdfStatsBuilder {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        word_vectors: Arc<dyn WordVectorStore>,
        segmenter: Arc<dyn Segmenter>,
        tokenizers: Arc<TokenizerSet>,
        config: IdfConfig,
    ) -> Self {
        Self {
            documents,
            word_vectors,
            segmenter,
            tokenizers,
            config,
        }
    }

    /// Recompute and overwrite the idf of every token of `lang`.
    ///
    /// Safe to re-run from scratch. A failed batch write is logged and
    /// counted in the report; every other failure returns before any write.
    pub async fn build_idf(&self, lang: &str) -> Result<IdfReport, IdfError> {
        let started = Instant::now();

        let store = Arc::clone(&self.word_vectors);
        let owned_lang = lang.to_string();
        let vocabulary =
            tokio::task::spawn_blocking(move || store.vocabulary(&owned_lang)).await??;
        if vocabulary.is_empty() {
            return Err(IdfError::EmptyVocabulary(lang.to_string()));
        }
        let vocabulary = Arc::new(vocabulary);
        info!(lang, vocabulary = vocabulary.len(), "idf run started");

        let (corpus_size, frequency) = self.scan(lang, &vocabulary).await?;
        if corpus_size == 0 {
            return Err(IdfError::EmptyCorpus(lang.to_string()));
        }

        let scores = compute_idf(&vocabulary, &frequency, corpus_size);
        let min_idf = scores
            .iter()
            .map(|(_, idf)| *idf)
            .reduce(f64::min)
            .unwrap_or(0.0);

        let (batches_written, batches_failed) = self.write_scores(lang, scores).await;

        let snapshot = CorpusSnapshot {
            lang: lang.to_string(),
            corpus_size,
            vocabulary_size: vocabulary.len() as u64,
            observed_tokens: frequency.len() as u64,
            computed_at: chrono::Utc::now().to_rfc3339(),
        };
        if batches_written > 0 {
            let store = Arc::clone(&self.word_vectors);
            let record = snapshot.clone();
            match tokio::task::spawn_blocking(move || store.record_snapshot(&record)).await? {
                Ok(()) => {}
                Err(e) => warn!(lang, error = ?e, "failed to record corpus snapshot"),
            }
        }

        let report = IdfReport {
            lang: lang.to_string(),
            corpus_size,
            vocabulary_size: snapshot.vocabulary_size,
            observed_tokens: snapshot.observed_tokens,
            min_idf,
            batches_written,
            batches_failed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            lang,
            corpus_size,
            observed_tokens = report.observed_tokens,
            batches_written,
            batches_failed,
            elapsed_ms = report.elapsed_ms,
            "idf run finished"
        );
        Ok(report)
    }

    /// Walk the qualifying documents and count, per vocabulary token, the
    /// documents containing it.
    async fn scan(
        &self,
        lang: &str,
        vocabulary: &Arc<HashSet<String>>,
    ) -> Result<(u64, HashMap<String, u64>), IdfError> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks: JoinSet<Result<HashSet<String>, IdfError>> = JoinSet::new();
        let mut frequency: HashMap<String, u64> = HashMap::new();
        let mut corpus_size = 0u64;

        let mut cursor =
            QualifyingCursor::new(lang, self.config.min_word_count, self.config.page_size);
        while !cursor.is_exhausted() {
            let documents = Arc::clone(&self.documents);
            let (page, advanced) = tokio::task::spawn_blocking(move || {
                let page = documents.next_qualifying(&mut cursor)?;
                Ok::<_, anyhow::Error>((page, cursor))
            })
            .await??;
            cursor = advanced;
            debug!(lang, page = page.len(), scanned = corpus_size, "qualifying page fetched");

            for doc_id in page {
                corpus_size += 1;
                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| IdfError::Store(e.into()))?;
                let segmenter = Arc::clone(&self.segmenter);
                let tokenizers = Arc::clone(&self.tokenizers);
                let vocabulary = Arc::clone(vocabulary);
                let lang = lang.to_string();
                tasks.spawn(async move {
                    let _permit = permit;
                    distinct_known_tokens(segmenter, tokenizers, vocabulary, doc_id, lang).await
                });

                // returning early drops the set, which aborts the rest of the scan
                while let Some(joined) = tasks.try_join_next() {
                    merge(&mut frequency, joined??);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            merge(&mut frequency, joined??);
        }
        Ok((corpus_size, frequency))
    }

    async fn write_scores(&self, lang: &str, scores: Vec<(String, f64)>) -> (usize, usize) {
        let mut written = 0;
        let mut failed = 0;
        for (index, chunk) in scores.chunks(self.config.write_batch_size.max(1)).enumerate() {
            let batch = Arc::new(chunk.to_vec());
            let result = with_retries(self.config.max_write_attempts, "idf batch write", || {
                let store = Arc::clone(&self.word_vectors);
                let batch = Arc::clone(&batch);
                let lang = lang.to_string();
                async move {
                    tokio::task::spawn_blocking(move || store.update_idf(&lang, &batch)).await?
                }
            })
            .await;
            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    error!(lang, batch = index, size = chunk.len(), error = ?e, "idf batch dropped");
                    failed += 1;
                }
            }
        }
        (written, failed)
    }
}

async fn distinct_known_tokens(
    segmenter: Arc<dyn Segmenter>,
    tokenizers: Arc<TokenizerSet>,
    vocabulary: Arc<HashSet<String>>,
    doc_id: String,
    lang: String,
) -> Result<HashSet<String>, IdfError> {
    let sentences = segmenter.segment(&doc_id, Some(&lang)).await?;
    let Some(text) = join_by_language(&sentences, std::slice::from_ref(&lang)).remove(&lang) else {
        return Ok(HashSet::new());
    };

    tokio::task::spawn_blocking(move || {
        let tokens = tokenizers.tokenize(&lang, &text)?;
        let known: HashSet<String> = tokens
            .into_iter()
            .filter(|token| vocabulary.contains(token))
            .collect();
        Ok::<_, IdfError>(known)
    })
    .await?
}

fn merge(frequency: &mut HashMap<String, u64>, tokens: HashSet<String>) {
    for token in tokens {
        *frequency.entry(token).or_default() += 1;
    }
}
