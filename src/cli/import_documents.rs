use anyhow::{Context, Result};
use std::path::Path;

use docvec::config::VectorizerConfig;
use docvec::db;
use docvec::store::documents::NewDocument;
use docvec::store::SqliteDocuments;

/// Import documents from a JSON array.
///
/// Existing documents are updated in place; their vectorization state is kept.
pub fn import_documents(config: &VectorizerConfig, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;
    let documents: Vec<NewDocument> =
        serde_json::from_str(&json).context("failed to parse import JSON")?;

    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    let store = SqliteDocuments::new(db::share(conn));

    println!("Importing {} documents...", documents.len());
    let mut unsupported = 0u64;
    for doc in &documents {
        store
            .upsert_document(doc)
            .with_context(|| format!("failed to import document {}", doc.id))?;
        if doc
            .languages
            .iter()
            .all(|l| !config.languages.supported.contains(&l.lang))
        {
            unsupported += 1;
        }
    }

    println!("Import complete:");
    println!("  Documents imported: {}", documents.len());
    if unsupported > 0 {
        println!("  Without a supported language: {unsupported}");
    }
    Ok(())
}
