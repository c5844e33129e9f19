//! The long-running vectorization loop.
//!
//! Each iteration selects a batch of pending documents, vectorizes them on a
//! bounded pool, persists every successful result in one bulk write, mirrors
//! the index-language vectors into the nearest-neighbor index, and pings the
//! heartbeat. Failed documents are left pending and come back on a later pass.
//!
//! Independent workers share nothing but the store. When the pending
//! population is large each worker starts its batch at a random offset, and
//! every write is a full overwrite, so overlapping batches are harmless.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::Rng;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::vectorizer::{DocumentVectorizer, VectorResult};
use super::{with_retries, Heartbeat};
use crate::config::WorkerConfig;
use crate::store::vector_index::index_id;
use crate::store::{
    DocumentStore, DocumentUpdate, IndexEntry, LanguageUpdate, PendingDocument, VectorIndex,
};

const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// What one iteration did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IterationReport {
    pub pending_total: u64,
    pub selected: usize,
    pub vectorized: usize,
    pub failed: usize,
    pub persisted: bool,
    pub indexed: usize,
    pub elapsed: Duration,
}

pub struct IncrementalWorker {
    documents: Arc<dyn DocumentStore>,
    vectorizer: Arc<DocumentVectorizer>,
    heartbeat: Arc<dyn Heartbeat>,
    index: Option<(Arc<dyn VectorIndex>, String)>,
    config: WorkerConfig,
    heartbeat_timeout: Duration,
}

impl IncrementalWorker {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        vectorizer: Arc<DocumentVectorizer>,
        heartbeat: Arc<dyn Heartbeat>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            documents,
            vectorizer,
            heartbeat,
            index: None,
            config,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }

    /// Mirror every published `lang` vector into `index`.
    pub fn with_index(mut self, index: Arc<dyn VectorIndex>, lang: impl Into<String>) -> Self {
        self.index = Some((index, lang.into()));
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Loop forever. Sleeps after an empty batch or a failed iteration.
    pub async fn run(&self) -> Result<()> {
        info!(
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            "worker started"
        );
        loop {
            match self.run_once().await {
                Ok(report) if report.selected > 0 => {}
                Ok(_) => {
                    debug!(idle_secs = self.config.idle_sleep_secs, "nothing pending, sleeping");
                    tokio::time::sleep(self.config.idle_sleep()).await;
                }
                Err(e) => {
                    error!(error = ?e, "worker iteration failed");
                    tokio::time::sleep(self.config.idle_sleep()).await;
                }
            }
        }
    }

    /// One select → vectorize → persist → index → heartbeat pass.
    pub async fn run_once(&self) -> Result<IterationReport> {
        let started = Instant::now();
        let languages = self.vectorizer.languages().to_vec();

        let documents = Arc::clone(&self.documents);
        let langs = languages.clone();
        let pending_total =
            tokio::task::spawn_blocking(move || documents.count_pending(&langs)).await??;

        let offset = sample_offset(
            pending_total,
            self.config.batch_size,
            self.config.random_offset_factor,
            &mut rand::thread_rng(),
        );
        let documents = Arc::clone(&self.documents);
        let langs = languages.clone();
        let limit = self.config.batch_size;
        let batch =
            tokio::task::spawn_blocking(move || documents.select_pending(&langs, limit, offset))
                .await??;

        let mut report = IterationReport {
            pending_total,
            selected: batch.len(),
            ..Default::default()
        };

        if !batch.is_empty() {
            debug!(pending_total, offset, selected = batch.len(), "batch selected");
            let (outcomes, panicked) = self.vectorize_batch(batch).await;
            report.failed += panicked;

            let mut updates = Vec::with_capacity(outcomes.len());
            let mut entries = Vec::new();
            for (doc, outcome) in outcomes {
                match outcome {
                    Ok(results) => {
                        updates.push(document_update(&doc.id, &languages, &results));
                        if let Some(entry) = self.index_entry(&doc, &results) {
                            entries.push(entry);
                        }
                        report.vectorized += 1;
                    }
                    Err(reason) => {
                        warn!(
                            doc_id = %doc.id,
                            error = %reason,
                            "vectorization failed, document stays pending"
                        );
                        report.failed += 1;
                    }
                }
            }

            if !updates.is_empty() {
                report.persisted = self.persist(updates).await;
            }
            if report.persisted && !entries.is_empty() {
                report.indexed = self.upsert_index(entries).await;
            }
        }

        report.elapsed = started.elapsed();
        self.beat(report.elapsed).await;

        if report.selected > 0 {
            info!(
                pending_total = report.pending_total,
                selected = report.selected,
                vectorized = report.vectorized,
                failed = report.failed,
                persisted = report.persisted,
                indexed = report.indexed,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "iteration finished"
            );
        }
        Ok(report)
    }

    /// Vectorize every document on a bounded pool. Outcomes come back in
    /// selection order. A document whose task panicked is left out and only
    /// counted in the second return value.
    async fn vectorize_batch(
        &self,
        batch: Vec<PendingDocument>,
    ) -> (
        Vec<(PendingDocument, Result<BTreeMap<String, VectorResult>, String>)>,
        usize,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut slots: Vec<Option<_>> = Vec::with_capacity(batch.len());
        let mut lost = Vec::new();
        let mut panicked = 0;

        for (position, doc) in batch.into_iter().enumerate() {
            slots.push(None);
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    lost.push((position, doc, e.to_string()));
                    continue;
                }
            };
            let vectorizer = Arc::clone(&self.vectorizer);
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = vectorizer.vectorize(&doc.id).await.map_err(|e| e.to_string());
                (position, doc, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, doc, outcome)) => slots[position] = Some((doc, outcome)),
                // the document identity went down with the task; it stays pending
                Err(e) => {
                    error!(error = %e, "vectorization task panicked");
                    panicked += 1;
                }
            }
        }
        for (position, doc, reason) in lost {
            slots[position] = Some((doc, Err(reason)));
        }
        (slots.into_iter().flatten().collect(), panicked)
    }

    fn index_entry(
        &self,
        doc: &PendingDocument,
        results: &BTreeMap<String, VectorResult>,
    ) -> Option<IndexEntry> {
        let (_, lang) = self.index.as_ref()?;
        let result = results.get(lang)?;
        let vector = result.vector.clone()?;
        Some(IndexEntry {
            id: index_id(&doc.author, &doc.permlink),
            doc_id: doc.id.clone(),
            lang: lang.clone(),
            author: doc.author.clone(),
            permlink: doc.permlink.clone(),
            parent_permlink: doc.parent_permlink.clone(),
            tags: doc.tags.clone(),
            created_at: doc.created_at.clone(),
            known_token_ratio: result.known_token_ratio,
            vector,
        })
    }

    /// One bulk write with bounded retries. Returns whether it landed.
    async fn persist(&self, updates: Vec<DocumentUpdate>) -> bool {
        let count = updates.len();
        let updates = Arc::new(updates);
        let timeout = self.config.write_timeout();
        let result = with_retries(self.config.max_write_attempts, "document batch write", || {
            let documents = Arc::clone(&self.documents);
            let updates = Arc::clone(&updates);
            async move {
                tokio::time::timeout(
                    timeout,
                    tokio::task::spawn_blocking(move || documents.apply_updates(&updates)),
                )
                .await
                .context("document batch write timed out")??
            }
        })
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(count, error = ?e, "dropping document batch, documents stay pending");
                false
            }
        }
    }

    async fn upsert_index(&self, entries: Vec<IndexEntry>) -> usize {
        let Some((index, _)) = &self.index else {
            return 0;
        };
        let index = Arc::clone(index);
        let count = entries.len();
        match tokio::task::spawn_blocking(move || index.upsert(&entries)).await {
            Ok(Ok(())) => count,
            Ok(Err(e)) => {
                warn!(count, error = ?e, "vector index upsert failed");
                0
            }
            Err(e) => {
                warn!(count, error = %e, "vector index task failed");
                0
            }
        }
    }

    async fn beat(&self, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match tokio::time::timeout(self.heartbeat_timeout, self.heartbeat.beat("OK", elapsed_ms))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = ?e, "heartbeat failed"),
            Err(_) => warn!(
                timeout_ms = self.heartbeat_timeout.as_millis() as u64,
                "heartbeat timed out"
            ),
        }
    }
}

/// Random starting offset once the pending population exceeds
/// `batch_size * factor`, else 0. The offset never leaves less than a full
/// batch behind it.
fn sample_offset(
    pending_total: u64,
    batch_size: usize,
    factor: usize,
    rng: &mut impl Rng,
) -> u64 {
    let batch = batch_size as u64;
    let threshold = batch.saturating_mul(factor as u64);
    if pending_total <= threshold {
        return 0;
    }
    rng.gen_range(0..=pending_total.saturating_sub(batch))
}

/// Mark `doc_id` vectorized in every supported language. Languages the
/// document had no text for are written with no vector and no ratio.
fn document_update(
    doc_id: &str,
    languages: &[String],
    results: &BTreeMap<String, VectorResult>,
) -> DocumentUpdate {
    let languages = languages
        .iter()
        .map(|lang| match results.get(lang) {
            Some(result) => LanguageUpdate {
                lang: lang.clone(),
                vector: result.vector.clone(),
                known_token_ratio: Some(result.known_token_ratio),
            },
            None => LanguageUpdate {
                lang: lang.clone(),
                vector: None,
                known_token_ratio: None,
            },
        })
        .collect();
    DocumentUpdate {
        doc_id: doc_id.to_string(),
        languages,
    }
}
