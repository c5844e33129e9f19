//! The vectorization pipeline: corpus IDF statistics, per-document TF-IDF
//! vectors, and the worker loop that keeps stored vectors current.

pub mod heartbeat;
pub mod idf;
pub mod vectorizer;
pub mod worker;

use std::future::Future;

use tracing::warn;

pub use heartbeat::{Heartbeat, HttpHeartbeat, NoopHeartbeat};
pub use idf::{compute_idf, IdfReport, IdfStatsBuilder};
pub use vectorizer::{weigh_tokens, ConfidenceGate, DocumentVectorizer, VectorResult};
pub use worker::{IncrementalWorker, IterationReport};

/// Run `op` up to `max_attempts` times, back to back.
///
/// Every failed attempt is logged; the last error is returned once the
/// attempts are used up.
pub async fn with_retries<T, F, Fut>(max_attempts: usize, what: &str, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                warn!(what, attempt, max_attempts, error = %e, "write failed, retrying");
                attempt += 1;
            }
            Err(e) => {
                return Err(e.context(format!("{what} failed after {max_attempts} attempts")));
            }
        }
    }
}
