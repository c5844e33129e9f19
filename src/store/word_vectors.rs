//! SQLite binding of [`WordVectorStore`] over the `word_vectors` table.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use super::{CorpusSnapshot, WordVector, WordVectorStore, EMBEDDING_DIM};
use crate::db::{self, SharedConnection};

/// Tokens this long are tokenizer debris, never real words.
pub const MAX_TOKEN_CHARS: usize = 100;

#[derive(Clone)]
pub struct SqliteWordVectors {
    db: SharedConnection,
}

impl SqliteWordVectors {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    /// Delete the whole vocabulary of `lang`. Returns the number of rows removed.
    pub fn clear_language(&self, lang: &str) -> Result<usize> {
        let conn = db::lock(&self.db)?;
        let removed = conn.execute("DELETE FROM word_vectors WHERE lang = ?1", params![lang])?;
        Ok(removed)
    }

    /// Insert or replace embeddings in one transaction. Any previous idf of a
    /// replaced token is reset, since it described the old vocabulary.
    pub fn insert_vectors(&self, lang: &str, rows: &[(String, Vec<f32>)]) -> Result<usize> {
        let mut conn = db::lock(&self.db)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO word_vectors (lang, token, embedding, idf) VALUES (?1, ?2, ?3, NULL)",
            )?;
            for (token, embedding) in rows {
                anyhow::ensure!(
                    embedding.len() == EMBEDDING_DIM,
                    "embedding for '{token}' has {} dimensions, expected {EMBEDDING_DIM}",
                    embedding.len()
                );
                stmt.execute(params![lang, token, db::embedding_to_bytes(embedding)])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn count(&self, lang: &str) -> Result<u64> {
        let conn = db::lock(&self.db)?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM word_vectors WHERE lang = ?1",
            params![lang],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Tokens of `lang` that have never received an idf.
    pub fn count_missing_idf(&self, lang: &str) -> Result<u64> {
        let conn = db::lock(&self.db)?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM word_vectors WHERE lang = ?1 AND idf IS NULL",
            params![lang],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Raw idf column for one token (`None` when unknown or never computed).
    pub fn idf(&self, lang: &str, token: &str) -> Result<Option<f64>> {
        let conn = db::lock(&self.db)?;
        let idf: Option<Option<f64>> = conn
            .query_row(
                "SELECT idf FROM word_vectors WHERE lang = ?1 AND token = ?2",
                params![lang, token],
                |row| row.get(0),
            )
            .optional()?;
        Ok(idf.flatten())
    }
}

impl WordVectorStore for SqliteWordVectors {
    fn vocabulary(&self, lang: &str) -> Result<HashSet<String>> {
        let conn = db::lock(&self.db)?;
        let mut stmt = conn.prepare("SELECT token FROM word_vectors WHERE lang = ?1")?;
        let tokens = stmt
            .query_map(params![lang], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(tokens)
    }

    fn lookup(&self, lang: &str, tokens: &[String]) -> Result<HashMap<String, WordVector>> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }
        let token_json = serde_json::to_string(tokens)?;

        let conn = db::lock(&self.db)?;
        let mut stmt = conn.prepare_cached(
            "SELECT token, embedding, idf FROM word_vectors \
             WHERE lang = ?1 AND token IN (SELECT value FROM json_each(?2))",
        )?;
        let rows = stmt
            .query_map(params![lang, token_json], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut found = HashMap::with_capacity(rows.len());
        for (token, blob, idf) in rows {
            let embedding = db::bytes_to_embedding(&blob)
                .with_context(|| format!("corrupt embedding for token '{token}' ({lang})"))?;
            found.insert(
                token,
                WordVector {
                    embedding,
                    idf: idf.unwrap_or(0.0),
                },
            );
        }
        Ok(found)
    }

    fn update_idf(&self, lang: &str, batch: &[(String, f64)]) -> Result<()> {
        let mut conn = db::lock(&self.db)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE word_vectors SET idf = ?1 WHERE lang = ?2 AND token = ?3",
            )?;
            for (token, idf) in batch {
                stmt.execute(params![idf, lang, token])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn record_snapshot(&self, snapshot: &CorpusSnapshot) -> Result<()> {
        let conn = db::lock(&self.db)?;
        conn.execute(
            "INSERT INTO corpus_snapshots (lang, corpus_size, vocabulary_size, observed_tokens, computed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.lang,
                snapshot.corpus_size as i64,
                snapshot.vocabulary_size as i64,
                snapshot.observed_tokens as i64,
                snapshot.computed_at,
            ],
        )?;
        Ok(())
    }

    fn latest_snapshot(&self, lang: &str) -> Result<Option<CorpusSnapshot>> {
        let conn = db::lock(&self.db)?;
        let snapshot = conn
            .query_row(
                "SELECT lang, corpus_size, vocabulary_size, observed_tokens, computed_at \
                 FROM corpus_snapshots WHERE lang = ?1 ORDER BY id DESC LIMIT 1",
                params![lang],
                |row| {
                    Ok(CorpusSnapshot {
                        lang: row.get(0)?,
                        corpus_size: row.get::<_, i64>(1)? as u64,
                        vocabulary_size: row.get::<_, i64>(2)? as u64,
                        observed_tokens: row.get::<_, i64>(3)? as u64,
                        computed_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }
}

/// Parse one line of a fastText `.vec` text file: `token f1 f2 ... f300`.
///
/// Returns `Ok(None)` for lines that should be skipped: the `<count> <dim>`
/// header, blank lines, and over-long tokens.
pub fn parse_fasttext_line(line: &str) -> Result<Option<(String, Vec<f32>)>> {
    let line = line.trim_end();
    let mut parts = line.split(' ');
    let token = match parts.next() {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(None),
    };
    if token.chars().count() >= MAX_TOKEN_CHARS {
        return Ok(None);
    }

    let values = parts
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid float in vector for '{token}'"))?;

    // header line: "<count> <dim>"
    if values.len() == 1 && token.parse::<u64>().is_ok() {
        return Ok(None);
    }
    anyhow::ensure!(
        values.len() == EMBEDDING_DIM,
        "vector for '{token}' has {} dimensions, expected {EMBEDDING_DIM}",
        values.len()
    );
    Ok(Some((token.to_string(), values)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteWordVectors {
        SqliteWordVectors::new(db::share(db::open_memory_database().unwrap()))
    }

    fn one_hot(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[i] = 1.0;
        v
    }

    #[test]
    fn lookup_returns_only_known_tokens() {
        let store = store();
        store
            .insert_vectors("es", &[("casa".to_string(), one_hot(0)), ("perro".to_string(), one_hot(1))])
            .unwrap();

        let found = store
            .lookup("es", &["casa".to_string(), "xyz123".to_string()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["casa"].embedding, one_hot(0));
        assert_eq!(found["casa"].idf, 0.0, "idf defaults to zero before any IDF run");
    }

    #[test]
    fn lookup_is_scoped_by_language() {
        let store = store();
        store.insert_vectors("es", &[("casa".to_string(), one_hot(0))]).unwrap();
        assert!(store.lookup("en", &["casa".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn update_idf_leaves_embedding_untouched() {
        let store = store();
        store.insert_vectors("es", &[("casa".to_string(), one_hot(7))]).unwrap();
        store.update_idf("es", &[("casa".to_string(), 0.69897)]).unwrap();

        let found = store.lookup("es", &["casa".to_string()]).unwrap();
        assert_eq!(found["casa"].embedding, one_hot(7));
        assert!((found["casa"].idf - 0.69897).abs() < 1e-12);
        assert_eq!(store.count_missing_idf("es").unwrap(), 0);
    }

    #[test]
    fn insert_rejects_wrong_dimension() {
        let store = store();
        assert!(store.insert_vectors("es", &[("casa".to_string(), vec![1.0; 3])]).is_err());
        assert_eq!(store.count("es").unwrap(), 0);
    }

    #[test]
    fn snapshots_return_latest() {
        let store = store();
        assert!(store.latest_snapshot("es").unwrap().is_none());
        for corpus_size in [10, 12] {
            store
                .record_snapshot(&CorpusSnapshot {
                    lang: "es".into(),
                    corpus_size,
                    vocabulary_size: 3,
                    observed_tokens: 2,
                    computed_at: chrono::Utc::now().to_rfc3339(),
                })
                .unwrap();
        }
        assert_eq!(store.latest_snapshot("es").unwrap().unwrap().corpus_size, 12);
    }

    #[test]
    fn parse_fasttext_skips_header_and_long_tokens() {
        assert!(parse_fasttext_line("2000000 300").unwrap().is_none());
        assert!(parse_fasttext_line("").unwrap().is_none());
        let long = format!("{} 0.1", "a".repeat(MAX_TOKEN_CHARS));
        assert!(parse_fasttext_line(&long).unwrap().is_none());
    }

    #[test]
    fn parse_fasttext_reads_vector() {
        let values: Vec<String> = (0..EMBEDDING_DIM).map(|i| format!("{}", i as f32 * 0.5)).collect();
        let line = format!("casa {} \n", values.join(" "));
        let (token, vector) = parse_fasttext_line(&line).unwrap().unwrap();
        assert_eq!(token, "casa");
        assert_eq!(vector.len(), EMBEDDING_DIM);
        assert_eq!(vector[3], 1.5);
    }

    #[test]
    fn parse_fasttext_rejects_short_vector() {
        assert!(parse_fasttext_line("casa 0.1 0.2 0.3").is_err());
    }
}
