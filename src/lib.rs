use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, WebvecError>;

#[derive(Error, Debug)]
pub enum WebvecError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate URL: already submitted as {url_id}")]
    Duplicate {
        url_id: Uuid,
        project_id: Uuid,
        last_updated_at: NaiveDateTime,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("chunk batch is empty")]
    EmptyBatch,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl WebvecError {
    /// Whether retrying the same call could succeed. Validation failures are
    /// permanent; only transport-level failures are worth retrying.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable(_) | Self::StorageUnavailable(_)
        )
    }
}

impl From<sqlx::Error> for WebvecError {
    #[inline]
    fn from(error: sqlx::Error) -> Self {
        Self::StorageUnavailable(error.to_string())
    }
}

pub mod api;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod ingest;
pub mod lifecycle;
pub mod query;
