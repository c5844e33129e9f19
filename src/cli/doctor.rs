//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use docvec::config::VectorizerConfig;
use docvec::db;

pub fn doctor(config: &VectorizerConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `docvec import-documents` or `docvec import-vectors` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("docvec Health Report");
    println!("====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("sqlite-vec:        {}", report.sqlite_vec_version);
    println!("Segmenter:         {}", config.segmenter.url);
    println!(
        "Heartbeat:         {}",
        config.service.heartbeat_url.as_deref().unwrap_or("(disabled)")
    );
    println!();
    println!("Row counts:");
    println!("  Documents:       {}", report.document_count);
    println!("  Word vectors:    {}", report.word_vector_count);
    println!("  Index entries:   {}", report.index_entry_count);
    if report.word_vector_count == 0 {
        println!("  WARNING: no word vectors loaded; `docvec serve` will refuse to start.");
    }
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db ~/.docvec/corpus.db");
        println!("  2. Or rebuild: re-import documents and vectors, then `docvec build-idf`.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
