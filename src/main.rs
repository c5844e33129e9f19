mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docvec::config::VectorizerConfig;

#[derive(Parser)]
#[command(name = "docvec", version, about = "TF-IDF weighted document embeddings")]
struct Cli {
    /// Config file (default: ~/.docvec/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the incremental vectorizer worker
    Serve,
    /// Recompute corpus idf for one language
    BuildIdf {
        #[arg(long)]
        lang: String,
    },
    /// Load a fastText .vec file into the word vector store
    ImportVectors {
        #[arg(long)]
        lang: String,
        #[arg(long)]
        file: PathBuf,
        /// Keep the existing vocabulary instead of replacing it
        #[arg(long)]
        append: bool,
    },
    /// Load documents and their language word counts from a JSON array
    ImportDocuments { file: PathBuf },
    /// Vectorize one document and print the result without storing it
    Vectorize { doc_id: String },
    /// Clear vectorized flags so documents are processed again
    Requeue {
        #[arg(long)]
        lang: Option<String>,
    },
    /// Show corpus and pipeline statistics
    Stats,
    /// Check database health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => VectorizerConfig::load_from(path)?,
        None => VectorizerConfig::load()?,
    };

    // stdout carries command output; logs go to stderr
    let filter = EnvFilter::try_new(&config.service.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => docvec::service::serve(config).await?,
        Command::BuildIdf { lang } => cli::build_idf::build_idf(config, &lang).await?,
        Command::ImportVectors { lang, file, append } => {
            cli::import_vectors::import_vectors(&config, &lang, &file, append)?
        }
        Command::ImportDocuments { file } => {
            cli::import_documents::import_documents(&config, &file)?
        }
        Command::Vectorize { doc_id } => cli::vectorize::vectorize(config, &doc_id).await?,
        Command::Requeue { lang } => cli::requeue::requeue(&config, lang.as_deref())?,
        Command::Stats => cli::stats::stats(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
