//! CLI `vectorize` command: dry run of the vectorizer for one document.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;

use docvec::config::VectorizerConfig;
use docvec::service::Pipeline;

#[derive(Serialize)]
struct LanguageSummary {
    known_token_ratio: f64,
    known_token_count: u64,
    total_token_count: u64,
    has_vector: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    norm: Option<f64>,
}

pub async fn vectorize(config: VectorizerConfig, doc_id: &str) -> Result<()> {
    let pipeline = Pipeline::open(config)?;
    let results = pipeline
        .vectorizer()
        .vectorize(doc_id)
        .await
        .with_context(|| format!("failed to vectorize {doc_id}"))?;

    let summary: BTreeMap<String, LanguageSummary> = results
        .into_iter()
        .map(|(lang, result)| {
            let norm = result
                .vector
                .as_ref()
                .map(|v| v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt());
            let summary = LanguageSummary {
                known_token_ratio: result.known_token_ratio,
                known_token_count: result.known_token_count,
                total_token_count: result.total_token_count,
                has_vector: result.vector.is_some(),
                norm,
            };
            (lang, summary)
        })
        .collect();

    if summary.is_empty() {
        println!("Document {doc_id} has no text in a supported language.");
    } else {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
