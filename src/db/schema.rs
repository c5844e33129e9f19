//! SQL DDL for all docvec tables.
//!
//! Defines the `documents`, `document_languages`, `document_vectors`,
//! `word_vectors`, `doc_index_meta`, `doc_index_vec` (vec0), and `schema_meta`
//! tables. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for the corpus and vocabulary tables.
const SCHEMA_SQL: &str = r#"
-- Corpus documents (posts, comments, replies)
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    author TEXT NOT NULL,
    permlink TEXT NOT NULL,
    parent_permlink TEXT,
    tags TEXT,
    created_at TEXT NOT NULL,
    lang_detected INTEGER NOT NULL DEFAULT 0,
    UNIQUE(author, permlink)
);

CREATE INDEX IF NOT EXISTS idx_documents_lang_detected ON documents(lang_detected);

-- Detected-language word counts, written by the language detector
CREATE TABLE IF NOT EXISTS document_languages (
    doc_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    lang TEXT NOT NULL,
    word_count INTEGER NOT NULL,
    PRIMARY KEY (doc_id, lang)
);

CREATE INDEX IF NOT EXISTS idx_document_languages_lang ON document_languages(lang, word_count);

-- Per-(document, language) vectorizer job state and result
CREATE TABLE IF NOT EXISTS document_vectors (
    doc_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    lang TEXT NOT NULL,
    vectorized INTEGER NOT NULL DEFAULT 0,
    vector BLOB,
    known_token_ratio REAL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (doc_id, lang)
);

CREATE INDEX IF NOT EXISTS idx_document_vectors_state ON document_vectors(lang, vectorized);

-- Pretrained word embeddings plus corpus idf, one vocabulary per language
CREATE TABLE IF NOT EXISTS word_vectors (
    lang TEXT NOT NULL,
    token TEXT NOT NULL,
    embedding BLOB NOT NULL,
    idf REAL,
    PRIMARY KEY (lang, token)
);

-- Metadata for the nearest-neighbor document index
CREATE TABLE IF NOT EXISTS doc_index_meta (
    id TEXT PRIMARY KEY,
    doc_id TEXT NOT NULL,
    lang TEXT NOT NULL,
    author TEXT NOT NULL,
    permlink TEXT NOT NULL,
    parent_permlink TEXT,
    tags TEXT,
    created_at TEXT NOT NULL,
    known_token_ratio REAL NOT NULL,
    indexed_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// vec0 virtual table must be created separately (sqlite-vec syntax).
const VEC_TABLE_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS doc_index_vec USING vec0(
    id TEXT PRIMARY KEY,
    embedding FLOAT[300]
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(VEC_TABLE_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
