
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::database::vector::DistanceMetric;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedderConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "all-minilm:latest".to_string(),
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorConfig {
    /// Fixed embedding dimension D. Every stored chunk and every query vector
    /// must have exactly this length.
    pub dimension: u32,
    /// Distance metric, fixed per deployment.
    pub metric: DistanceMetric,
    /// Per-URL chunk counts at or below this are searched with an exact scan
    /// instead of the ANN index.
    pub brute_force_threshold: usize,
    /// Multiplier applied to top_k when generating ANN candidates, to survive
    /// post-filtering down to one URL's chunks.
    pub candidate_oversample: usize,
    /// How often the background maintenance task checks whether the ANN index
    /// needs a rebuild. Bounds index staleness.
    pub maintenance_interval_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            metric: DistanceMetric::Cosine,
            brute_force_threshold: 256,
            candidate_oversample: 4,
            maintenance_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueryConfig {
    pub max_query_chars: usize,
    pub max_top_k: usize,
    pub default_top_k: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_query_chars: 1000,
            max_top_k: 50,
            default_top_k: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid brute force threshold: {0} (must be at least 1)")]
    InvalidBruteForceThreshold(usize),
    #[error("Invalid candidate oversample: {0} (must be between 1 and 64)")]
    InvalidCandidateOversample(usize),
    #[error("Invalid query length limit: {0} (must be between 1 and 100000)")]
    InvalidMaxQueryChars(usize),
    #[error("Invalid top_k limit: {0} (must be between 1 and 1000)")]
    InvalidMaxTopK(usize),
    #[error("Default top_k ({0}) must not exceed the top_k limit ({1})")]
    DefaultTopKTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_dir()?)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                embedder: EmbedderConfig::default(),
                vector: VectorConfig::default(),
                query: QueryConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedder.validate()?;
        self.vector.validate()?;
        self.query.validate()?;
        Ok(())
    }

    /// Path of the SQLite database holding projects, URLs, and chunks.
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("webvec.db")
    }

    /// Base URL of the embedding endpoint.
    #[inline]
    pub fn embedder_url(&self) -> Result<Url, ConfigError> {
        let raw = format!(
            "{}://{}:{}",
            self.embedder.protocol, self.embedder.host, self.embedder.port
        );
        Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl(raw))
    }
}

impl EmbedderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }
        Ok(())
    }
}

impl VectorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.dimension < 64 || self.dimension > 4096 {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }
        if self.brute_force_threshold == 0 {
            return Err(ConfigError::InvalidBruteForceThreshold(
                self.brute_force_threshold,
            ));
        }
        if self.candidate_oversample == 0 || self.candidate_oversample > 64 {
            return Err(ConfigError::InvalidCandidateOversample(
                self.candidate_oversample,
            ));
        }
        Ok(())
    }
}

impl QueryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_query_chars == 0 || self.max_query_chars > 100_000 {
            return Err(ConfigError::InvalidMaxQueryChars(self.max_query_chars));
        }
        if self.max_top_k == 0 || self.max_top_k > 1000 {
            return Err(ConfigError::InvalidMaxTopK(self.max_top_k));
        }
        if self.default_top_k > self.max_top_k {
            return Err(ConfigError::DefaultTopKTooLarge(
                self.default_top_k,
                self.max_top_k,
            ));
        }
        Ok(())
    }
}

fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("webvec"))
        .ok_or(ConfigError::DirectoryError)
}
