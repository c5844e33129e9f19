use anyhow::Result;

use docvec::config::VectorizerConfig;

/// Display corpus and pipeline statistics in the terminal.
pub fn stats(config: &VectorizerConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = docvec::db::open_database(&db_path)?;

    let response = docvec::store::stats::corpus_stats(
        &conn,
        &config.languages.supported,
        Some(&db_path),
    )?;

    println!("Corpus Statistics");
    println!("{}", "=".repeat(40));
    println!("  Documents:           {}", response.total_documents);
    println!("  Language detected:   {}", response.language_detected);
    println!("  Index entries:       {}", response.index_entries);
    println!();

    for (lang, s) in &response.by_language {
        println!("Language '{lang}':");
        println!("  Pending:             {}", s.pending);
        println!("  Vectorized:          {}", s.vectorized);
        println!("  With vector:         {}", s.with_vector);
        println!("  Vocabulary:          {}", s.vocabulary);
        println!("  Missing idf:         {}", s.missing_idf);
        match &s.last_idf_run {
            Some(run) => println!(
                "  Last idf run:        {} ({} documents)",
                run.computed_at, run.corpus_size
            ),
            None => println!("  Last idf run:        never"),
        }
        println!();
    }

    println!("Database size:         {} bytes", response.db_size_bytes);
    Ok(())
}
