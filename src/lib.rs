//! TF-IDF weighted document embeddings for a multilingual corpus.
//!
//! docvec turns pre-trained word embeddings into per-document vectors. Each
//! document's text is split by language, tokenized, and summed into one
//! 300-dimension vector per language, weighting every known token by its
//! term frequency in the document and its inverse document frequency in the
//! corpus.
//!
//! # Architecture
//!
//! - **Storage**: SQLite for documents, job flags and word vectors;
//!   [sqlite-vec](https://github.com/asg017/sqlite-vec) for the nearest-neighbor index
//! - **Segmentation**: an external HTTP service splits documents into
//!   language-tagged sentences
//! - **IDF**: an offline batch run per language over the qualifying corpus
//! - **Worker**: a long-running loop that vectorizes pending documents in
//!   bounded-concurrency batches and persists results idempotently
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`store`]: Store traits and their SQLite bindings
//! - [`segment`]: Language-segmentation client
//! - [`text`]: Per-language tokenizers
//! - [`pipeline`]: IDF builder, document vectorizer, and incremental worker
//! - [`service`]: Component wiring and startup checks

pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod segment;
pub mod service;
pub mod store;
pub mod text;
