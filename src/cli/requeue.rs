use anyhow::Result;

use docvec::config::VectorizerConfig;
use docvec::db;
use docvec::store::SqliteDocuments;

/// Clear vectorized flags for one language, or for all of them.
pub fn requeue(config: &VectorizerConfig, lang: Option<&str>) -> Result<()> {
    if let Some(lang) = lang {
        anyhow::ensure!(
            config.languages.supported.iter().any(|l| l == lang),
            "language '{lang}' is not in the supported set {:?}",
            config.languages.supported
        );
    }

    let conn = db::open_database(config.resolved_db_path())?;
    let store = SqliteDocuments::new(db::share(conn));
    let reset = store.requeue(lang)?;

    match lang {
        Some(lang) => println!("Requeued {reset} '{lang}' results."),
        None => println!("Requeued {reset} results across all languages."),
    }
    Ok(())
}
