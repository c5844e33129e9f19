//! sqlite-vec binding of [`VectorIndex`].
//!
//! Vectors live in the `doc_index_vec` vec0 table, metadata in
//! `doc_index_meta`; both are keyed by [`index_id`].

use anyhow::Result;
use rusqlite::params;
use uuid::Uuid;

use super::{IndexEntry, VectorIndex, EMBEDDING_DIM};
use crate::db::{self, SharedConnection};

/// Deterministic index id for a document: UUIDv5 over `author/permlink`.
pub fn index_id(author: &str, permlink: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{author}/{permlink}").as_bytes()).to_string()
}

#[derive(Clone)]
pub struct SqliteVecIndex {
    db: SharedConnection,
}

impl SqliteVecIndex {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    pub fn count(&self) -> Result<u64> {
        let conn = db::lock(&self.db)?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM doc_index_meta", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Ids of the `k` entries nearest to `query`, closest first.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<(String, f64)>> {
        anyhow::ensure!(
            query.len() == EMBEDDING_DIM,
            "query has {} dimensions, expected {EMBEDDING_DIM}",
            query.len()
        );
        let conn = db::lock(&self.db)?;
        let mut stmt = conn.prepare(
            "SELECT id, distance FROM doc_index_vec WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![db::embedding_to_bytes(query), k as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hits)
    }
}

impl VectorIndex for SqliteVecIndex {
    fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut conn = db::lock(&self.db)?;
        let tx = conn.transaction()?;
        for entry in entries {
            anyhow::ensure!(
                entry.vector.len() == EMBEDDING_DIM,
                "index vector for {} has {} dimensions, expected {EMBEDDING_DIM}",
                entry.doc_id,
                entry.vector.len()
            );
            // vec0 has no upsert; replace the row
            tx.execute("DELETE FROM doc_index_vec WHERE id = ?1", params![entry.id])?;
            tx.execute(
                "INSERT INTO doc_index_vec (id, embedding) VALUES (?1, ?2)",
                params![entry.id, db::embedding_to_bytes(&entry.vector)],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO doc_index_meta \
                 (id, doc_id, lang, author, permlink, parent_permlink, tags, created_at, known_token_ratio, indexed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    entry.id,
                    entry.doc_id,
                    entry.lang,
                    entry.author,
                    entry.permlink,
                    entry.parent_permlink,
                    serde_json::to_string(&entry.tags)?,
                    entry.created_at,
                    entry.known_token_ratio,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
