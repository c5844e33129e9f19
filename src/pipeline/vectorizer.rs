//! TF-IDF weighted document vectors.
//!
//! A document's vector for one language is the literal sum, over its distinct
//! known tokens, of `tf * idf * embedding`, where `tf` is the token's count
//! divided by the total token count (unknown tokens included). There is no
//! renormalization. Vectors built from too little evidence are withheld by
//! the [`ConfidenceGate`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ndarray::{Array1, ArrayView1};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::GateConfig;
use crate::error::VectorizeError;
use crate::segment::{join_by_language, Segmenter};
use crate::store::{WordVector, WordVectorStore, EMBEDDING_DIM};
use crate::text::TokenizerSet;

/// Minimum evidence a per-language vector needs before it is published.
/// Both bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    pub min_known_tokens: u64,
    pub min_known_ratio: f64,
}

impl ConfidenceGate {
    pub fn passes(&self, known_token_count: u64, known_token_ratio: f64) -> bool {
        known_token_count > self.min_known_tokens && known_token_ratio > self.min_known_ratio
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::from(&GateConfig::default())
    }
}

impl From<&GateConfig> for ConfidenceGate {
    fn from(config: &GateConfig) -> Self {
        Self {
            min_known_tokens: config.min_known_tokens,
            min_known_ratio: config.min_known_ratio,
        }
    }
}

/// Outcome for one language of one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorResult {
    /// `None` when the gate rejected the evidence.
    #[serde(skip_serializing)]
    pub vector: Option<Vec<f32>>,
    pub known_token_ratio: f64,
    pub known_token_count: u64,
    pub total_token_count: u64,
}

impl VectorResult {
    fn empty() -> Self {
        Self {
            vector: None,
            known_token_ratio: 0.0,
            known_token_count: 0,
            total_token_count: 0,
        }
    }
}

/// Aggregate a token sequence into a weighted document vector.
///
/// `lookup` holds the store entries of the tokens that are known; everything
/// else counts toward the total only.
pub fn weigh_tokens(
    tokens: &[String],
    lookup: &HashMap<String, WordVector>,
    gate: &ConfidenceGate,
) -> VectorResult {
    if tokens.is_empty() {
        return VectorResult::empty();
    }
    let total = tokens.len() as u64;

    // ordered so the float summation is reproducible
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_default() += 1;
    }

    let mut known = 0u64;
    let mut sum = Array1::<f32>::zeros(EMBEDDING_DIM);
    for (token, count) in counts {
        let Some(word) = lookup.get(token) else {
            continue;
        };
        if word.embedding.len() != EMBEDDING_DIM {
            warn!(
                token,
                dimensions = word.embedding.len(),
                "embedding has wrong dimension, treating token as unknown"
            );
            continue;
        }
        known += count;
        let tf = count as f64 / total as f64;
        let weight = (tf * word.idf) as f32;
        sum.scaled_add(weight, &ArrayView1::from(word.embedding.as_slice()));
    }

    let ratio = known as f64 / total as f64;
    let vector = gate.passes(known, ratio).then(|| sum.to_vec());
    VectorResult {
        vector,
        known_token_ratio: ratio,
        known_token_count: known,
        total_token_count: total,
    }
}

/// Computes per-language vectors for single documents. Read-only: nothing is
/// persisted here.
pub struct DocumentVectorizer {
    segmenter: Arc<dyn Segmenter>,
    tokenizers: Arc<TokenizerSet>,
    word_vectors: Arc<dyn WordVectorStore>,
    languages: Vec<String>,
    gate: ConfidenceGate,
}

impl DocumentVectorizer {
    pub fn new(
        segmenter: Arc<dyn Segmenter>,
        tokenizers: Arc<TokenizerSet>,
        word_vectors: Arc<dyn WordVectorStore>,
        languages: Vec<String>,
        gate: ConfidenceGate,
    ) -> Self {
        Self {
            segmenter,
            tokenizers,
            word_vectors,
            languages,
            gate,
        }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Vectorize `doc_id` in every language it has text for.
    ///
    /// Supported languages without any sentence are absent from the map. Any
    /// failure discards the results of every language.
    pub async fn vectorize(
        &self,
        doc_id: &str,
    ) -> Result<BTreeMap<String, VectorResult>, VectorizeError> {
        let sentences = self.segmenter.segment(doc_id, None).await?;
        let texts = join_by_language(&sentences, &self.languages);
        debug!(doc_id, languages = texts.len(), "document segmented");

        let tokenizers = Arc::clone(&self.tokenizers);
        let word_vectors = Arc::clone(&self.word_vectors);
        let gate = self.gate;
        let results = tokio::task::spawn_blocking(move || {
            let mut results = BTreeMap::new();
            for (lang, text) in texts {
                let tokens = tokenizers.tokenize(&lang, &text)?;
                let mut distinct = tokens.clone();
                distinct.sort_unstable();
                distinct.dedup();
                let lookup = word_vectors.lookup(&lang, &distinct)?;
                results.insert(lang, weigh_tokens(&tokens, &lookup, &gate));
            }
            Ok::<_, VectorizeError>(results)
        })
        .await
        .map_err(|source| VectorizeError::Task {
            doc_id: doc_id.to_string(),
            source,
        })??;

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(i: usize, value: f32) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[i] = value;
        v
    }

    fn tokens(counts: &[(&str, usize)]) -> Vec<String> {
        counts
            .iter()
            .flat_map(|(t, n)| std::iter::repeat(t.to_string()).take(*n))
            .collect()
    }

    fn word(embedding: Vec<f32>, idf: f64) -> WordVector {
        WordVector { embedding, idf }
    }

    #[test]
    fn empty_input_is_absent() {
        let result = weigh_tokens(&[], &HashMap::new(), &ConfidenceGate::default());
        assert_eq!(result, VectorResult::empty());
    }

    #[test]
    fn few_known_tokens_are_gated_despite_high_ratio() {
        let lookup = HashMap::from([("casa".to_string(), word(one_hot(0, 1.0), 0.7))]);
        let result = weigh_tokens(
            &tokens(&[("casa", 3), ("xyz123", 1)]),
            &lookup,
            &ConfidenceGate::default(),
        );
        assert_eq!(result.known_token_count, 3);
        assert_eq!(result.total_token_count, 4);
        assert!((result.known_token_ratio - 0.75).abs() < 1e-12);
        assert!(result.vector.is_none());
    }

    #[test]
    fn low_ratio_is_gated() {
        let lookup = HashMap::from([("casa".to_string(), word(one_hot(0, 1.0), 0.7))]);
        // 7 known of 20: enough tokens, ratio 0.35 is not above the bound
        let result = weigh_tokens(
            &tokens(&[("casa", 7), ("zzz", 13)]),
            &lookup,
            &ConfidenceGate::default(),
        );
        assert_eq!(result.known_token_count, 7);
        assert!(result.vector.is_none());
    }

    #[test]
    fn exactly_five_known_tokens_is_gated() {
        let lookup = HashMap::from([("casa".to_string(), word(one_hot(0, 1.0), 0.7))]);
        let result = weigh_tokens(&tokens(&[("casa", 5)]), &lookup, &ConfidenceGate::default());
        assert!((result.known_token_ratio - 1.0).abs() < 1e-12);
        assert!(result.vector.is_none());
    }

    #[test]
    fn weighted_sum_matches_fixture() {
        // 20 tokens: 10 distinct known tokens covering 15 occurrences, 5 unknown
        let mut lookup = HashMap::new();
        let mut counts = Vec::new();
        let names: Vec<String> = (0..10).map(|i| format!("w{i}")).collect();
        for (i, name) in names.iter().enumerate() {
            lookup.insert(name.clone(), word(one_hot(i, (i + 1) as f32), 0.1 * (i + 1) as f64));
            counts.push((name.as_str(), if i < 5 { 2 } else { 1 }));
        }
        counts.push(("unk", 5));
        let result = weigh_tokens(&tokens(&counts), &lookup, &ConfidenceGate::default());

        assert_eq!(result.total_token_count, 20);
        assert_eq!(result.known_token_count, 15);
        assert!((result.known_token_ratio - 0.75).abs() < 1e-12);

        let vector = result.vector.unwrap();
        for i in 0..10 {
            let count = if i < 5 { 2.0 } else { 1.0 };
            let expected = (count / 20.0) * (0.1 * (i + 1) as f64) * (i + 1) as f64;
            assert!(
                (vector[i] as f64 - expected).abs() < 1e-6,
                "dim {i}: {} vs {expected}",
                vector[i]
            );
        }
        assert!(vector[10..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn scaling_idf_scales_vector() {
        let build = |c: f64| {
            let lookup = HashMap::from([
                ("a".to_string(), word(vec![0.5; EMBEDDING_DIM], 0.3 * c)),
                ("b".to_string(), word(one_hot(2, -1.0), 1.1 * c)),
            ]);
            weigh_tokens(&tokens(&[("a", 4), ("b", 3)]), &lookup, &ConfidenceGate::default())
                .vector
                .unwrap()
        };
        let base = build(1.0);
        let scaled = build(2.5);
        for (b, s) in base.iter().zip(&scaled) {
            assert!((b * 2.5 - s).abs() < 1e-5);
        }
    }

    #[test]
    fn wrong_dimension_embedding_counts_as_unknown() {
        let lookup = HashMap::from([("bad".to_string(), word(vec![1.0; 3], 1.0))]);
        let result = weigh_tokens(&tokens(&[("bad", 10)]), &lookup, &ConfidenceGate::default());
        assert_eq!(result.known_token_count, 0);
        assert!(result.vector.is_none());
    }
}
