//! Service wiring: opens the database, builds the pipeline components and
//! runs the worker.
//!
//! [`serve`] refuses to start when a supported language has no word vectors,
//! since every vector it would produce is empty.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::VectorizerConfig;
use crate::db::{self, SharedConnection};
use crate::pipeline::{
    ConfidenceGate, DocumentVectorizer, Heartbeat, HttpHeartbeat, IdfStatsBuilder,
    IncrementalWorker, NoopHeartbeat,
};
use crate::segment::{HttpSegmenter, Segmenter};
use crate::store::{SqliteDocuments, SqliteVecIndex, SqliteWordVectors, WordVectorStore};
use crate::text::TokenizerSet;

/// Everything the pipeline needs, backed by one shared database connection.
pub struct Pipeline {
    pub db: SharedConnection,
    pub documents: Arc<SqliteDocuments>,
    pub word_vectors: Arc<SqliteWordVectors>,
    pub index: Arc<SqliteVecIndex>,
    pub segmenter: Arc<dyn Segmenter>,
    pub tokenizers: Arc<TokenizerSet>,
    pub config: Arc<VectorizerConfig>,
}

impl Pipeline {
    /// Open the configured database and segmentation client.
    pub fn open(config: VectorizerConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        let conn = db::open_database(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;
        tracing::info!(db = %db_path.display(), "database ready");

        let segmenter: Arc<dyn Segmenter> = Arc::new(
            HttpSegmenter::new(&config.segmenter).context("failed to create segmenter client")?,
        );
        Ok(Self::with_connection(db::share(conn), segmenter, config))
    }

    pub fn with_connection(
        db: SharedConnection,
        segmenter: Arc<dyn Segmenter>,
        config: VectorizerConfig,
    ) -> Self {
        let tokenizers = Arc::new(TokenizerSet::word_tokenizers(
            &config.languages.supported,
            config.languages.lowercase,
        ));
        Self {
            documents: Arc::new(SqliteDocuments::new(Arc::clone(&db))),
            word_vectors: Arc::new(SqliteWordVectors::new(Arc::clone(&db))),
            index: Arc::new(SqliteVecIndex::new(Arc::clone(&db))),
            db,
            segmenter,
            tokenizers,
            config: Arc::new(config),
        }
    }

    pub fn vectorizer(&self) -> DocumentVectorizer {
        DocumentVectorizer::new(
            Arc::clone(&self.segmenter),
            Arc::clone(&self.tokenizers),
            self.word_vectors.clone(),
            self.config.languages.supported.clone(),
            ConfidenceGate::from(&self.config.vectorizer),
        )
    }

    pub fn idf_builder(&self) -> IdfStatsBuilder {
        IdfStatsBuilder::new(
            self.documents.clone(),
            self.word_vectors.clone(),
            Arc::clone(&self.segmenter),
            Arc::clone(&self.tokenizers),
            self.config.idf.clone(),
        )
    }

    pub fn worker(&self) -> Result<IncrementalWorker> {
        let timeout = Duration::from_secs(self.config.service.heartbeat_timeout_secs);
        let heartbeat: Arc<dyn Heartbeat> = match &self.config.service.heartbeat_url {
            Some(url) => Arc::new(HttpHeartbeat::new(url, timeout)?),
            None => Arc::new(NoopHeartbeat),
        };

        let worker = IncrementalWorker::new(
            self.documents.clone(),
            Arc::new(self.vectorizer()),
            heartbeat,
            self.config.worker.clone(),
        )
        .with_heartbeat_timeout(timeout);

        if self.config.worker.index_enabled {
            Ok(worker.with_index(self.index.clone(), self.config.languages.index_language.clone()))
        } else {
            Ok(worker)
        }
    }

    /// Fail when a supported language has no vocabulary; warn when its idf
    /// has never been computed.
    pub fn startup_checks(&self) -> Result<()> {
        for lang in &self.config.languages.supported {
            let vocabulary = self.word_vectors.count(lang)?;
            anyhow::ensure!(
                vocabulary > 0,
                "no word vectors loaded for '{lang}'; run `docvec import-vectors --lang {lang}` first"
            );
            match self.word_vectors.latest_snapshot(lang)? {
                Some(snapshot) => tracing::info!(
                    lang = %lang,
                    vocabulary,
                    corpus_size = snapshot.corpus_size,
                    computed_at = %snapshot.computed_at,
                    "word vectors ready"
                ),
                None => tracing::warn!(
                    lang = %lang,
                    vocabulary,
                    "idf never computed, vectors will be zero until `docvec build-idf` runs"
                ),
            }
        }
        Ok(())
    }
}

/// Run the incremental worker until the process is killed.
pub async fn serve(config: VectorizerConfig) -> Result<()> {
    let pipeline = Pipeline::open(config)?;
    pipeline.startup_checks()?;
    tracing::info!(
        languages = ?pipeline.config.languages.supported,
        segmenter = %pipeline.config.segmenter.url,
        "starting vectorizer worker"
    );
    pipeline.worker()?.run().await
}
