use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::CorpusSnapshot;

/// Pipeline progress for one supported language.
#[derive(Debug, Serialize)]
pub struct LanguageStats {
    pub pending: u64,
    pub vectorized: u64,
    /// Vectorized rows whose vector passed the confidence gate.
    pub with_vector: u64,
    pub vocabulary: u64,
    pub missing_idf: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_idf_run: Option<CorpusSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_documents: u64,
    pub language_detected: u64,
    pub index_entries: u64,
    pub by_language: BTreeMap<String, LanguageStats>,
    pub db_size_bytes: u64,
}

/// Compute corpus and pipeline statistics for `languages`.
///
/// `db_path` is used for file size calculation; pass None for in-memory databases.
pub fn corpus_stats(
    conn: &Connection,
    languages: &[String],
    db_path: Option<&Path>,
) -> Result<StatsResponse> {
    let total_documents = count(conn, "SELECT COUNT(*) FROM documents", [])?;
    let language_detected = count(
        conn,
        "SELECT COUNT(*) FROM documents WHERE lang_detected = 1",
        [],
    )?;
    let index_entries = count(conn, "SELECT COUNT(*) FROM doc_index_meta", [])?;

    let mut by_language = BTreeMap::new();
    for lang in languages {
        by_language.insert(lang.clone(), language_stats(conn, lang, language_detected)?);
    }

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        total_documents,
        language_detected,
        index_entries,
        by_language,
        db_size_bytes,
    })
}

fn language_stats(conn: &Connection, lang: &str, detected: u64) -> Result<LanguageStats> {
    let vectorized = count(
        conn,
        "SELECT COUNT(*) FROM document_vectors v JOIN documents d ON d.id = v.doc_id \
         WHERE v.lang = ?1 AND v.vectorized = 1 AND d.lang_detected = 1",
        params![lang],
    )?;
    let with_vector = count(
        conn,
        "SELECT COUNT(*) FROM document_vectors WHERE lang = ?1 AND vectorized = 1 AND vector IS NOT NULL",
        params![lang],
    )?;
    let vocabulary = count(
        conn,
        "SELECT COUNT(*) FROM word_vectors WHERE lang = ?1",
        params![lang],
    )?;
    let missing_idf = count(
        conn,
        "SELECT COUNT(*) FROM word_vectors WHERE lang = ?1 AND idf IS NULL",
        params![lang],
    )?;
    let last_idf_run = last_snapshot(conn, lang)?;

    Ok(LanguageStats {
        pending: detected.saturating_sub(vectorized),
        vectorized,
        with_vector,
        vocabulary,
        missing_idf,
        last_idf_run,
    })
}

fn count<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<u64> {
    let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(n as u64)
}

fn last_snapshot(conn: &Connection, lang: &str) -> Result<Option<CorpusSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT corpus_size, vocabulary_size, observed_tokens, computed_at \
         FROM corpus_snapshots WHERE lang = ?1 ORDER BY id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map(params![lang], |row| {
        Ok(CorpusSnapshot {
            lang: lang.to_string(),
            corpus_size: row.get::<_, i64>(0)? as u64,
            vocabulary_size: row.get::<_, i64>(1)? as u64,
            observed_tokens: row.get::<_, i64>(2)? as u64,
            computed_at: row.get(3)?,
        })
    })?;
    Ok(rows.next().transpose()?)
}
