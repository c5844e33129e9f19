pub mod build_idf;
pub mod doctor;
pub mod import_documents;
pub mod import_vectors;
pub mod requeue;
pub mod stats;
pub mod vectorize;

use indicatif::{ProgressBar, ProgressStyle};

/// Byte-based progress bar for file imports.
fn byte_progress(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta}) {msg}")
            .expect("valid template")
            .progress_chars("##-"),
    );
    pb
}
