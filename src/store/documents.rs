//! SQLite binding of [`DocumentStore`].
//!
//! Documents and their detected-language word counts are written by whatever
//! ingests the corpus (see [`SqliteDocuments::upsert_document`]); the
//! `document_vectors` rows are written only by the vectorizer worker.

use std::collections::BTreeSet;

use anyhow::Result;
use rusqlite::{params, OptionalExtension};
use serde::Deserialize;

use super::{DocumentStore, DocumentUpdate, JobState, PendingDocument, QualifyingCursor};
use crate::db::{self, SharedConnection};

/// Predicate shared by the pending count and the pending selection.
/// `?1` is a JSON array of distinct language codes, `?2` its length.
const PENDING_FILTER: &str = "d.lang_detected = 1 \
     AND (SELECT COUNT(*) FROM document_vectors v \
          WHERE v.doc_id = d.id AND v.vectorized = 1 \
            AND v.lang IN (SELECT value FROM json_each(?1))) < ?2";

/// Detected word count of one language in a document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LanguageCount {
    pub lang: String,
    pub word_count: u32,
}

/// A document as delivered by corpus ingestion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewDocument {
    pub id: String,
    pub author: String,
    pub permlink: String,
    #[serde(default)]
    pub parent_permlink: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: String,
    #[serde(default)]
    pub lang_detected: bool,
    #[serde(default)]
    pub languages: Vec<LanguageCount>,
}

/// What is persisted for one (document, language) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResult {
    pub state: JobState,
    pub vector: Option<Vec<f32>>,
    pub known_token_ratio: Option<f64>,
}

#[derive(Clone)]
pub struct SqliteDocuments {
    db: SharedConnection,
}

fn language_json(languages: &[String]) -> Result<(String, i64)> {
    let distinct: BTreeSet<&String> = languages.iter().collect();
    Ok((serde_json::to_string(&distinct)?, distinct.len() as i64))
}

impl SqliteDocuments {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    /// Insert a document or refresh its identity fields and language counts.
    /// Vectorizer job state is left as it is.
    pub fn upsert_document(&self, doc: &NewDocument) -> Result<()> {
        let mut conn = db::lock(&self.db)?;
        let tx = conn.transaction()?;
        let tags = serde_json::to_string(&doc.tags)?;
        tx.execute(
            "INSERT INTO documents (id, author, permlink, parent_permlink, tags, created_at, lang_detected) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(id) DO UPDATE SET author = excluded.author, permlink = excluded.permlink, \
               parent_permlink = excluded.parent_permlink, tags = excluded.tags, \
               created_at = excluded.created_at, lang_detected = excluded.lang_detected",
            params![
                doc.id,
                doc.author,
                doc.permlink,
                doc.parent_permlink,
                tags,
                doc.created_at,
                doc.lang_detected,
            ],
        )?;
        tx.execute("DELETE FROM document_languages WHERE doc_id = ?1", params![doc.id])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO document_languages (doc_id, lang, word_count) VALUES (?1, ?2, ?3)",
            )?;
            for count in &doc.languages {
                stmt.execute(params![doc.id, count.lang, count.word_count])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Clear `vectorized` flags so the worker picks the documents up again.
    /// Returns the number of (document, language) pairs reset.
    pub fn requeue(&self, lang: Option<&str>) -> Result<usize> {
        let conn = db::lock(&self.db)?;
        let now = chrono::Utc::now().to_rfc3339();
        let reset = conn.execute(
            "UPDATE document_vectors SET vectorized = 0, updated_at = ?2 \
             WHERE vectorized = 1 AND (?1 IS NULL OR lang = ?1)",
            params![lang, now],
        )?;
        tracing::info!(reset, lang = lang.unwrap_or("*"), "requeued documents");
        Ok(reset)
    }

    pub fn stored_result(&self, doc_id: &str, lang: &str) -> Result<Option<StoredResult>> {
        let conn = db::lock(&self.db)?;
        let row = conn
            .query_row(
                "SELECT vectorized, vector, known_token_ratio FROM document_vectors \
                 WHERE doc_id = ?1 AND lang = ?2",
                params![doc_id, lang],
                |row| {
                    Ok((
                        row.get::<_, bool>(0)?,
                        row.get::<_, Option<Vec<u8>>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(vectorized, blob, known_token_ratio)| -> Result<StoredResult> {
            Ok(StoredResult {
                state: JobState::from(vectorized),
                vector: blob.as_deref().map(db::bytes_to_embedding).transpose()?,
                known_token_ratio,
            })
        })
        .transpose()
    }
}

impl DocumentStore for SqliteDocuments {
    fn count_pending(&self, languages: &[String]) -> Result<u64> {
        let (lang_json, lang_count) = language_json(languages)?;
        let conn = db::lock(&self.db)?;
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM documents d WHERE {PENDING_FILTER}"),
            params![lang_json, lang_count],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    fn select_pending(
        &self,
        languages: &[String],
        limit: usize,
        offset: u64,
    ) -> Result<Vec<PendingDocument>> {
        let (lang_json, lang_count) = language_json(languages)?;
        let conn = db::lock(&self.db)?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT d.id, d.author, d.permlink, d.parent_permlink, d.tags, d.created_at \
             FROM documents d WHERE {PENDING_FILTER} \
             ORDER BY d.id LIMIT ?3 OFFSET ?4"
        ))?;
        let docs = stmt
            .query_map(
                params![lang_json, lang_count, limit as i64, offset as i64],
                |row| {
                    let tags: Option<String> = row.get(4)?;
                    Ok(PendingDocument {
                        id: row.get(0)?,
                        author: row.get(1)?,
                        permlink: row.get(2)?,
                        parent_permlink: row.get(3)?,
                        tags: tags
                            .and_then(|t| serde_json::from_str(&t).ok())
                            .unwrap_or_default(),
                        created_at: row.get(5)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    fn apply_updates(&self, updates: &[DocumentUpdate]) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut conn = db::lock(&self.db)?;
        let tx = conn.transaction()?;
        {
            // Documents deleted since selection are skipped rather than failing the batch.
            let mut stmt = tx.prepare_cached(
                "INSERT INTO document_vectors (doc_id, lang, vectorized, vector, known_token_ratio, updated_at) \
                 SELECT ?1, ?2, 1, ?3, ?4, ?5 WHERE EXISTS (SELECT 1 FROM documents WHERE id = ?1) \
                 ON CONFLICT(doc_id, lang) DO UPDATE SET vectorized = 1, vector = excluded.vector, \
                   known_token_ratio = excluded.known_token_ratio, updated_at = excluded.updated_at",
            )?;
            for update in updates {
                for lang in &update.languages {
                    stmt.execute(params![
                        update.doc_id,
                        lang.lang,
                        lang.vector.as_deref().map(db::embedding_to_bytes),
                        lang.known_token_ratio,
                        now,
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn next_qualifying(&self, cursor: &mut QualifyingCursor) -> Result<Vec<String>> {
        if cursor.is_exhausted() {
            return Ok(Vec::new());
        }
        let page = {
            let conn = db::lock(&self.db)?;
            let mut stmt = conn.prepare_cached(
                "SELECT d.id FROM documents d \
                 JOIN document_languages l ON l.doc_id = d.id \
                 WHERE l.lang = ?1 AND l.word_count >= ?2 AND (?3 IS NULL OR d.id > ?3) \
                 ORDER BY d.id LIMIT ?4",
            )?;
            let ids = stmt
                .query_map(
                    params![
                        cursor.lang,
                        cursor.min_word_count,
                        cursor.continuation(),
                        cursor.page_size as i64,
                    ],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        cursor.advance(&page);
        Ok(page)
    }

    fn job_state(&self, doc_id: &str, lang: &str) -> Result<JobState> {
        let conn = db::lock(&self.db)?;
        let vectorized: Option<bool> = conn
            .query_row(
                "SELECT vectorized FROM document_vectors WHERE doc_id = ?1 AND lang = ?2",
                params![doc_id, lang],
                |row| row.get(0),
            )
            .optional()?;
        Ok(JobState::from(vectorized.unwrap_or(false)))
    }
}
