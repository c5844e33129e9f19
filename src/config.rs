use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct VectorizerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub languages: LanguageConfig,
    pub segmenter: SegmenterConfig,
    pub vectorizer: GateConfig,
    pub idf: IdfConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
    pub heartbeat_url: Option<String>,
    pub heartbeat_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LanguageConfig {
    pub supported: Vec<String>,
    /// Language whose vectors are mirrored into the nearest-neighbor index.
    pub index_language: String,
    pub lowercase: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SegmenterConfig {
    pub url: String,
    pub timeout_secs: u64,
}

/// Confidence gate applied to every per-language document vector.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GateConfig {
    pub min_known_tokens: u64,
    pub min_known_ratio: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IdfConfig {
    pub min_word_count: u32,
    pub concurrency: usize,
    pub page_size: usize,
    pub write_batch_size: usize,
    pub max_write_attempts: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub idle_sleep_secs: u64,
    /// Pending population above `batch_size * random_offset_factor` triggers a random skip.
    pub random_offset_factor: usize,
    pub max_write_attempts: usize,
    pub write_timeout_secs: u64,
    pub index_enabled: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            heartbeat_url: None,
            heartbeat_timeout_secs: 10,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_docvec_dir()
            .join("corpus.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            supported: vec!["en".into(), "es".into()],
            index_language: "en".into(),
            lowercase: true,
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_known_tokens: 5,
            min_known_ratio: 0.35,
        }
    }
}

impl Default for IdfConfig {
    fn default() -> Self {
        Self {
            min_word_count: 15,
            concurrency: 8,
            page_size: 25,
            write_batch_size: 1000,
            max_write_attempts: 5,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            concurrency: 3,
            idle_sleep_secs: 8,
            random_offset_factor: 4,
            max_write_attempts: 5,
            write_timeout_secs: 60,
            index_enabled: true,
        }
    }
}

impl WorkerConfig {
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_secs(self.idle_sleep_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Returns `~/.docvec/`
pub fn default_docvec_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".docvec")
}

/// Returns the default config file path: `~/.docvec/config.toml`
pub fn default_config_path() -> PathBuf {
    default_docvec_dir().join("config.toml")
}

impl VectorizerConfig {
    /// Load config from the default TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            VectorizerConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (DOCVEC_DB, DOCVEC_LOG_LEVEL, LANG_DETECTOR_URL, VECTORIZER_HEARTBEAT_URL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DOCVEC_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("DOCVEC_LOG_LEVEL") {
            self.service.log_level = val;
        }
        if let Ok(val) = std::env::var("LANG_DETECTOR_URL") {
            self.segmenter.url = val;
        }
        if let Ok(val) = std::env::var("VECTORIZER_HEARTBEAT_URL") {
            if !val.trim().is_empty() {
                self.service.heartbeat_url = Some(val);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.languages.supported.is_empty(),
            "at least one supported language is required"
        );
        anyhow::ensure!(
            self.languages.supported.contains(&self.languages.index_language),
            "index language '{}' is not in the supported set {:?}",
            self.languages.index_language,
            self.languages.supported
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.vectorizer.min_known_ratio),
            "min_known_ratio must be between 0.0 and 1.0"
        );
        anyhow::ensure!(self.idf.concurrency > 0, "idf.concurrency must be positive");
        anyhow::ensure!(self.idf.page_size > 0, "idf.page_size must be positive");
        anyhow::ensure!(
            self.idf.write_batch_size > 0,
            "idf.write_batch_size must be positive"
        );
        anyhow::ensure!(self.worker.batch_size > 0, "worker.batch_size must be positive");
        anyhow::ensure!(self.worker.concurrency > 0, "worker.concurrency must be positive");
        anyhow::ensure!(
            self.idf.max_write_attempts > 0 && self.worker.max_write_attempts > 0,
            "max_write_attempts must be positive"
        );
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
