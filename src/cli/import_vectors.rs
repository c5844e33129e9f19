//! CLI `import-vectors` command: load a fastText text-format embedding file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use docvec::config::VectorizerConfig;
use docvec::db;
use docvec::store::word_vectors::parse_fasttext_line;
use docvec::store::SqliteWordVectors;

const BATCH_SIZE: usize = 2000;

pub fn import_vectors(
    config: &VectorizerConfig,
    lang: &str,
    file: &Path,
    append: bool,
) -> Result<()> {
    let handle =
        File::open(file).with_context(|| format!("failed to open {}", file.display()))?;
    let total_bytes = handle.metadata().map(|m| m.len()).unwrap_or(0);
    let reader = BufReader::new(handle);

    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path).context("failed to open database")?;
    let store = SqliteWordVectors::new(db::share(conn));

    if !append {
        let removed = store.clear_language(lang)?;
        if removed > 0 {
            println!("Removed {removed} existing '{lang}' word vectors.");
        }
    }

    println!("Importing '{lang}' word vectors from {}...", file.display());
    let pb = super::byte_progress(total_bytes);

    let mut batch = Vec::with_capacity(BATCH_SIZE);
    let mut imported = 0usize;
    let mut skipped = 0usize;
    for (number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", number + 1))?;
        pb.inc(line.len() as u64 + 1);
        match parse_fasttext_line(&line) {
            Ok(Some(row)) => batch.push(row),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(line = number + 1, error = %e, "skipping malformed vector");
                skipped += 1;
            }
        }
        if batch.len() >= BATCH_SIZE {
            imported += store.insert_vectors(lang, &batch)?;
            batch.clear();
            pb.set_message(format!("{imported} tokens"));
        }
    }
    if !batch.is_empty() {
        imported += store.insert_vectors(lang, &batch)?;
    }
    pb.finish_and_clear();

    println!("Imported {imported} '{lang}' word vectors.");
    if skipped > 0 {
        println!("Skipped {skipped} malformed lines.");
    }
    println!("Run `docvec build-idf --lang {lang}` to compute idf weights.");
    Ok(())
}
