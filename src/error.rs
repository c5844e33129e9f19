//! Typed errors for the vectorization pipeline seams.
//!
//! Store bindings return `anyhow::Result`; those errors enter the typed world
//! through the transparent `Store` variants.

use thiserror::Error;

/// Failure talking to the language-segmentation service.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("segmentation service returned {status} for document {doc_id}: {body}")]
    Status {
        doc_id: String,
        status: u16,
        body: String,
    },
    #[error("segmentation request for document {doc_id} failed")]
    Transport {
        doc_id: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("segmentation response for document {doc_id} could not be decoded: {reason}")]
    Decode { doc_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TokenizeError {
    #[error("no tokenizer configured for language '{0}'")]
    UnsupportedLanguage(String),
    #[error("pre-tokenization failed: {0}")]
    PreTokenize(String),
}

/// Failure vectorizing a single document. No partial per-language results
/// survive any of these.
#[derive(Debug, Error)]
pub enum VectorizeError {
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error("vectorization task for document {doc_id} did not complete")]
    Task {
        doc_id: String,
        #[source]
        source: tokio::task::JoinError,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Failure of an IDF statistics run. Any of these means nothing was written.
#[derive(Debug, Error)]
pub enum IdfError {
    #[error("no word vectors loaded for language '{0}'")]
    EmptyVocabulary(String),
    #[error("no qualifying documents for language '{0}'")]
    EmptyCorpus(String),
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error("document scan task did not complete")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
