//! CLI `build-idf` command: recompute idf for one language.

use anyhow::{Context, Result};

use docvec::config::VectorizerConfig;
use docvec::service::Pipeline;

pub async fn build_idf(config: VectorizerConfig, lang: &str) -> Result<()> {
    anyhow::ensure!(
        config.languages.supported.iter().any(|l| l == lang),
        "language '{lang}' is not in the supported set {:?}",
        config.languages.supported
    );

    let pipeline = Pipeline::open(config)?;
    let report = pipeline
        .idf_builder()
        .build_idf(lang)
        .await
        .with_context(|| format!("idf run for '{lang}' failed, nothing was applied"))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.batches_failed > 0 {
        eprintln!(
            "Warning: {} of {} idf batches could not be written; re-run to complete.",
            report.batches_failed,
            report.batches_failed + report.batches_written
        );
    }
    Ok(())
}
