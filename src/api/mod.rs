//! HTTP-shaped service surface.
//!
//! This is what router glue calls: response bodies are bit-exact with the
//! public API contract, and every failure maps to a structured
//! `{message, code}` payload plus an HTTP status. Routing, authentication,
//! and share tokens live outside the core.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::WebvecError;
use crate::database::sqlite::models::Chunk;
use crate::database::vector::VectorStore;
use crate::lifecycle::LifecycleCoordinator;
use crate::query::QueryEngine;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Structured error payload surfaced to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: String,
}

/// An error ready for the transport layer: HTTP status plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(status: u16, code: &str, message: String) -> Self {
        Self {
            status,
            body: ErrorBody {
                message,
                code: code.to_string(),
            },
        }
    }
}

impl From<WebvecError> for ApiError {
    #[inline]
    fn from(error: WebvecError) -> Self {
        match &error {
            WebvecError::NotFound(_) => Self::new(404, "URL_NOT_FOUND", error.to_string()),
            WebvecError::Duplicate { .. } => Self::new(409, "DUPLICATE_URL", error.to_string()),
            WebvecError::InvalidArgument(_)
            | WebvecError::DimensionMismatch { .. }
            | WebvecError::EmptyBatch => Self::new(400, "INVALID_QUERY", error.to_string()),
            WebvecError::InvalidState(_) => Self::new(409, "INVALID_URL_STATUS", error.to_string()),
            WebvecError::EmbeddingUnavailable(_)
            | WebvecError::StorageUnavailable(_)
            | WebvecError::Config(_)
            | WebvecError::Io(_)
            | WebvecError::Other(_) => {
                error!("Internal error surfaced to client: {}", error);
                Self::new(500, "CHUNK_PROCESSING_FAILED", error.to_string())
            }
        }
    }
}

/// `GET .../chunks` response item. The embedding is omitted unless the
/// caller asked for vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResponse {
    pub chunk_id: Uuid,
    pub url_id: Uuid,
    pub project_id: Uuid,
    pub content: String,
    pub chunk_index: i64,
    pub created_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl ChunkResponse {
    fn from_chunk(chunk: Chunk, include_vectors: bool) -> Self {
        Self {
            chunk_id: chunk.chunk_id,
            url_id: chunk.url_id,
            project_id: chunk.project_id,
            content: chunk.content,
            chunk_index: chunk.chunk_index,
            created_at: chunk.created_at,
            embedding: include_vectors.then_some(chunk.embedding),
        }
    }
}

/// `POST .../chunks:query` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkQueryRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkQueryResult {
    pub chunk_id: Uuid,
    pub content: String,
    pub similarity_score: f32,
    pub chunk_index: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkQueryResponse {
    pub results: Vec<ChunkQueryResult>,
}

/// The chunk endpoints' behavior, minus transport.
pub struct ChunkService {
    lifecycle: Arc<LifecycleCoordinator>,
    store: Arc<VectorStore>,
    engine: Arc<QueryEngine>,
}

impl ChunkService {
    #[inline]
    pub fn new(
        lifecycle: Arc<LifecycleCoordinator>,
        store: Arc<VectorStore>,
        engine: Arc<QueryEngine>,
    ) -> Self {
        Self {
            lifecycle,
            store,
            engine,
        }
    }

    /// Ordered chunk listing for a URL. Unknown url/project pairs are 404,
    /// never another tenant's rows.
    #[inline]
    pub async fn get_chunks(
        &self,
        url_id: Uuid,
        project_id: Uuid,
        include_vectors: bool,
    ) -> ApiResult<Vec<ChunkResponse>> {
        self.lifecycle.resolve_url(url_id, project_id).await?;

        let chunks = self.store.get_by_url(url_id, project_id).await?;
        Ok(chunks
            .into_iter()
            .map(|chunk| ChunkResponse::from_chunk(chunk, include_vectors))
            .collect())
    }

    /// Semantic similarity query over one URL's chunks, ranked by descending
    /// similarity score.
    #[inline]
    pub async fn query_chunks(
        &self,
        url_id: Uuid,
        project_id: Uuid,
        request: ChunkQueryRequest,
    ) -> ApiResult<ChunkQueryResponse> {
        let matches = self
            .engine
            .query(url_id, project_id, &request.query, request.top_k)
            .await?;

        Ok(ChunkQueryResponse {
            results: matches
                .into_iter()
                .map(|m| ChunkQueryResult {
                    chunk_id: m.chunk_id,
                    content: m.content,
                    similarity_score: m.similarity_score,
                    chunk_index: m.chunk_index,
                    created_at: m.created_at,
                })
                .collect(),
        })
    }
}
