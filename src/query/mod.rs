
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::config::QueryConfig;
use crate::database::vector::VectorStore;
use crate::embeddings::EmbeddingProvider;
use crate::lifecycle::LifecycleCoordinator;
use crate::{Result, WebvecError};

/// One ranked answer to a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub chunk_id: Uuid,
    pub content: String,
    pub similarity_score: f32,
    pub chunk_index: i64,
    pub created_at: NaiveDateTime,
}

/// Answers "find the chunks most similar to this text" for one URL.
///
/// Validation runs before the embedding call, so malformed input never costs
/// a model invocation. Results are ranked by descending similarity with
/// deterministic tie-breaking, reproducible across repeated calls.
pub struct QueryEngine {
    lifecycle: Arc<LifecycleCoordinator>,
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    limits: QueryConfig,
}

impl QueryEngine {
    #[inline]
    pub fn new(
        lifecycle: Arc<LifecycleCoordinator>,
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        limits: QueryConfig,
    ) -> Self {
        Self {
            lifecycle,
            store,
            embedder,
            limits,
        }
    }

    #[inline]
    pub fn default_top_k(&self) -> usize {
        self.limits.default_top_k
    }

    #[inline]
    pub async fn query(
        &self,
        url_id: Uuid,
        project_id: Uuid,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>> {
        self.lifecycle.resolve_url(url_id, project_id).await?;
        let trimmed = self.validate(query_text, top_k)?;

        let query_vector = self.embedder.embed(trimmed).await?;
        if query_vector.len() != self.store.dimension() {
            return Err(WebvecError::EmbeddingUnavailable(format!(
                "embedder returned {} dimensions, store expects {}",
                query_vector.len(),
                self.store.dimension()
            )));
        }

        let results = self
            .store
            .search(url_id, project_id, &query_vector, top_k)
            .await?;

        debug!(
            "Query over url {} returned {} of up to {} results",
            url_id,
            results.len(),
            top_k
        );

        Ok(results
            .into_iter()
            .map(|result| QueryMatch {
                chunk_id: result.chunk.chunk_id,
                content: result.chunk.content,
                similarity_score: result.similarity_score,
                chunk_index: result.chunk.chunk_index,
                created_at: result.chunk.created_at,
            })
            .collect())
    }

    /// Checks query text and top_k against the configured limits, returning
    /// the specific violated constraint. Runs before any embedding call.
    fn validate<'a>(&self, query_text: &'a str, top_k: usize) -> Result<&'a str> {
        let trimmed = query_text.trim();
        if trimmed.is_empty() {
            return Err(WebvecError::InvalidArgument(
                "query text must not be empty".to_string(),
            ));
        }
        if trimmed.chars().count() > self.limits.max_query_chars {
            return Err(WebvecError::InvalidArgument(format!(
                "query text exceeds {} characters",
                self.limits.max_query_chars
            )));
        }
        if top_k < 1 || top_k > self.limits.max_top_k {
            return Err(WebvecError::InvalidArgument(format!(
                "top_k must be between 1 and {}",
                self.limits.max_top_k
            )));
        }
        Ok(trimmed)
    }
}
