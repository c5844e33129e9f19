mod helpers;

use std::sync::Arc;

use docvec::db;
use docvec::store::{DocumentStore, JobState, SqliteDocuments, SqliteWordVectors, WordVectorStore};
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("corpus.db");
    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();

    assert!(db_path.exists());
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn health_check_passes_on_valid_db() {
    let conn = db::open_memory_database().unwrap();

    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
    assert!(!report.sqlite_vec_version.is_empty());
    assert_eq!(report.document_count, 0);
    assert_eq!(report.word_vector_count, 0);
    assert_eq!(report.index_entry_count, 0);
}

#[test]
fn busy_timeout_and_wal_are_set() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("corpus.db")).unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);

    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[test]
fn job_state_and_vocabulary_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("corpus.db");

    {
        let shared = db::share(db::open_database(&db_path).unwrap());
        helpers::seed_document(&shared, "doc-1", &[("es", 20)]);
        helpers::seed_vocabulary(&shared, "es", &["casa", "perro"]);
        SqliteDocuments::new(Arc::clone(&shared))
            .apply_updates(&[docvec::store::DocumentUpdate {
                doc_id: "doc-1".to_string(),
                languages: vec![docvec::store::LanguageUpdate {
                    lang: "es".to_string(),
                    vector: Some(helpers::one_hot(3, 0.5)),
                    known_token_ratio: Some(0.9),
                }],
            }])
            .unwrap();
    }

    let shared = db::share(db::open_database(&db_path).unwrap());
    let documents = SqliteDocuments::new(Arc::clone(&shared));
    assert_eq!(documents.job_state("doc-1", "es").unwrap(), JobState::Vectorized);
    let stored = documents.stored_result("doc-1", "es").unwrap().unwrap();
    assert_eq!(stored.vector, Some(helpers::one_hot(3, 0.5)));

    let words = SqliteWordVectors::new(shared);
    assert_eq!(words.vocabulary("es").unwrap().len(), 2);
}

#[test]
fn reopening_existing_db_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("corpus.db");
    drop(db::open_database(&db_path).unwrap());

    let conn = db::open_database(&db_path).unwrap();
    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
}
