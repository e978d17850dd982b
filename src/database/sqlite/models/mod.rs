#[cfg(test)]
mod tests;

use anyhow::{Result, bail};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub project_name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub user_id: Uuid,
    pub project_name: String,
}

/// Processing lifecycle of a submitted URL.
///
/// `pending → crawling → encoding → stored | failed`; `reprocess` returns a
/// stored or failed URL to `pending` after purging its chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UrlStatus {
    Pending,
    Crawling,
    Encoding,
    Stored,
    Failed,
}

impl UrlStatus {
    /// States still owned by the processing pipeline. `mark_failed` is only
    /// legal from these.
    #[inline]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending | Self::Crawling | Self::Encoding)
    }

    /// States from which a reprocess may be requested.
    #[inline]
    pub fn is_reprocessable(self) -> bool {
        matches!(self, Self::Stored | Self::Failed)
    }
}

impl std::fmt::Display for UrlStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            UrlStatus::Pending => write!(f, "pending"),
            UrlStatus::Crawling => write!(f, "crawling"),
            UrlStatus::Encoding => write!(f, "encoding"),
            UrlStatus::Stored => write!(f, "stored"),
            UrlStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UrlRecord {
    pub url_id: Uuid,
    pub project_id: Uuid,
    pub original_url: String,
    pub status: UrlStatus,
    pub failure_reason: Option<String>,
    pub submitted_at: NaiveDateTime,
    pub last_updated_at: NaiveDateTime,
}

impl UrlRecord {
    #[inline]
    pub fn is_stored(&self) -> bool {
        self.status == UrlStatus::Stored
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == UrlStatus::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUrl {
    pub project_id: Uuid,
    pub original_url: String,
}

/// A stored content chunk with its decoded embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: Uuid,
    pub url_id: Uuid,
    pub project_id: Uuid,
    pub content: String,
    pub chunk_index: i64,
    pub embedding: Vec<f32>,
    pub created_at: NaiveDateTime,
}

/// Raw chunk row as stored; the embedding is a little-endian f32 blob.
#[derive(Debug, Clone, FromRow)]
pub struct ChunkRow {
    pub chunk_id: Uuid,
    pub url_id: Uuid,
    pub project_id: Uuid,
    pub content: String,
    pub chunk_index: i64,
    pub embedding: Vec<u8>,
    pub created_at: NaiveDateTime,
}

impl TryFrom<ChunkRow> for Chunk {
    type Error = anyhow::Error;

    #[inline]
    fn try_from(row: ChunkRow) -> Result<Self> {
        let embedding = decode_embedding(&row.embedding)?;
        Ok(Chunk {
            chunk_id: row.chunk_id,
            url_id: row.url_id,
            project_id: row.project_id,
            content: row.content,
            chunk_index: row.chunk_index,
            embedding,
            created_at: row.created_at,
        })
    }
}

/// One chunk of an ingestion batch. Ordinals are assigned from the batch
/// position, so callers only provide content and vector.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub content: String,
    pub embedding: Vec<f32>,
}

impl NewChunk {
    #[inline]
    pub fn new(content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            content: content.into(),
            embedding,
        }
    }
}

/// Identity-only view of a chunk, used to build per-URL candidate sets for
/// filtered ANN search without pulling embeddings out of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct ChunkRef {
    pub chunk_id: Uuid,
    pub chunk_index: i64,
}

#[inline]
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

#[inline]
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        bail!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        );
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
