
pub mod index;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::VectorConfig;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{Chunk, NewChunk};
use crate::database::sqlite::queries::ChunkQueries;
use crate::{Result, WebvecError};

use index::AnnIndex;

/// Distance metric for the embedding space, fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    L2,
}

impl DistanceMetric {
    /// Exact distance between two vectors of equal length.
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (norm_a * norm_b)
            }
            Self::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }

    /// Monotonic mapping of a distance into a similarity score in [0, 1].
    /// Cosine: clamped cosine similarity. L2: 1 / (1 + d). Only the ordering
    /// is portable across metrics, not the score values.
    #[inline]
    pub fn similarity(self, distance: f32) -> f32 {
        match self {
            Self::Cosine => (1.0 - distance).clamp(0.0, 1.0),
            Self::L2 => 1.0 / (1.0 + distance.max(0.0)),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::L2 => write!(f, "l2"),
        }
    }
}

/// One ranked hit from a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub similarity_score: f32,
    pub distance: f32,
}

/// Durable, tenant-scoped chunk storage with top-K similarity search.
///
/// The SQLite chunk table is the source of truth; the ANN index is a derived
/// artifact rebuilt from it and never consulted without re-checking candidates
/// against the canonical per-URL id set. Small per-URL corpora skip the index
/// entirely and are exact-scanned.
pub struct VectorStore {
    pool: sqlx::SqlitePool,
    dimension: usize,
    metric: DistanceMetric,
    brute_force_threshold: usize,
    candidate_oversample: usize,
    index: RwLock<Option<Arc<AnnIndex>>>,
    index_stale: AtomicBool,
}

impl VectorStore {
    #[inline]
    pub fn new(database: &Database, config: &VectorConfig) -> Self {
        Self {
            pool: database.pool().clone(),
            dimension: config.dimension as usize,
            metric: config.metric,
            brute_force_threshold: config.brute_force_threshold,
            candidate_oversample: config.candidate_oversample,
            index: RwLock::new(None),
            index_stale: AtomicBool::new(true),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Insert an ordered chunk batch for one URL, assigning ordinals 0..N-1
    /// by batch position. The batch commits as a whole: readers either see
    /// every chunk or none, including when the calling task is cancelled
    /// mid-insert.
    #[inline]
    pub async fn put_batch(
        &self,
        url_id: Uuid,
        project_id: Uuid,
        chunks: &[NewChunk],
    ) -> Result<Vec<Chunk>> {
        if chunks.is_empty() {
            return Err(WebvecError::EmptyBatch);
        }
        self.validate_batch(chunks)?;

        let mut tx = self.pool.begin().await?;
        let created = ChunkQueries::insert_batch_tx(&mut tx, url_id, project_id, chunks)
            .await
            .map_err(storage_err)?;
        tx.commit().await?;

        self.mark_index_stale();
        info!("Stored {} chunks for url {}", created.len(), url_id);
        Ok(created)
    }

    /// All chunks for a URL in ordinal order. A url/project mismatch returns
    /// empty rather than leaking another tenant's rows.
    #[inline]
    pub async fn get_by_url(&self, url_id: Uuid, project_id: Uuid) -> Result<Vec<Chunk>> {
        ChunkQueries::list_by_url(&self.pool, url_id, project_id)
            .await
            .map_err(storage_err)
    }

    /// Remove every chunk owned by the URL. Idempotent.
    #[inline]
    pub async fn delete_by_url(&self, url_id: Uuid, project_id: Uuid) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        let removed = ChunkQueries::delete_by_url_tx(&mut conn, url_id, project_id)
            .await
            .map_err(storage_err)?;

        if removed > 0 {
            self.mark_index_stale();
            debug!("Deleted {} chunks for url {}", removed, url_id);
        }
        Ok(removed)
    }

    /// Top-K nearest chunks of one URL, ranked by ascending distance with
    /// ties broken by ascending ordinal. `top_k` is clamped to the number of
    /// available chunks.
    #[inline]
    pub async fn search(
        &self,
        url_id: Uuid,
        project_id: Uuid,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(WebvecError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }
        if query_vector.len() != self.dimension {
            return Err(WebvecError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        let refs = ChunkQueries::list_refs_by_url(&self.pool, url_id, project_id)
            .await
            .map_err(storage_err)?;
        if refs.is_empty() {
            return Ok(Vec::new());
        }

        if refs.len() <= self.brute_force_threshold {
            return self.exact_scan(url_id, project_id, query_vector, top_k).await;
        }

        let candidate_set: HashMap<Uuid, i64> = refs
            .iter()
            .map(|r| (r.chunk_id, r.chunk_index))
            .collect();

        let index = self.current_index().await?;
        let want = top_k.min(refs.len());
        let breadth = want.saturating_mul(self.candidate_oversample).max(50);
        let hits = index.search(query_vector, breadth, breadth * 2)?;

        let mut scored = Vec::with_capacity(want);
        for hit in hits {
            if !candidate_set.contains_key(&hit.chunk_id) {
                continue;
            }
            let Some(chunk) = ChunkQueries::get_by_id(&self.pool, hit.chunk_id)
                .await
                .map_err(storage_err)?
            else {
                // Deleted between index build and now; the canonical table wins.
                continue;
            };
            let distance = self.metric.distance(query_vector, &chunk.embedding);
            scored.push(SearchResult {
                similarity_score: self.metric.similarity(distance),
                distance,
                chunk,
            });
            if scored.len() >= want {
                break;
            }
        }

        if scored.len() < want {
            debug!(
                "ANN candidates underfilled ({}/{}) for url {}, falling back to exact scan",
                scored.len(),
                want,
                url_id
            );
            return self.exact_scan(url_id, project_id, query_vector, top_k).await;
        }

        sort_results(&mut scored);
        scored.truncate(want);
        Ok(scored)
    }

    async fn exact_scan(
        &self,
        url_id: Uuid,
        project_id: Uuid,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let chunks = self.get_by_url(url_id, project_id).await?;

        let mut scored: Vec<SearchResult> = chunks
            .into_iter()
            .map(|chunk| {
                let distance = self.metric.distance(query_vector, &chunk.embedding);
                SearchResult {
                    similarity_score: self.metric.similarity(distance),
                    distance,
                    chunk,
                }
            })
            .collect();

        sort_results(&mut scored);
        scored.truncate(top_k.min(scored.len()));
        Ok(scored)
    }

    /// Flag the ANN index as out of date with the canonical table. The next
    /// indexed search or maintenance tick rebuilds it.
    #[inline]
    pub fn mark_index_stale(&self) {
        self.index_stale.store(true, Ordering::Release);
    }

    /// Rebuild the ANN index from the canonical chunk table and swap it in.
    /// Readers keep using the previous index until the swap.
    #[inline]
    pub async fn rebuild_index(&self) -> Result<usize> {
        let corpus = ChunkQueries::list_embeddings(&self.pool)
            .await
            .map_err(storage_err)?;
        let count = corpus.len();

        let rebuilt = Arc::new(AnnIndex::build(self.metric, self.dimension, corpus)?);
        *self.index.write().await = Some(rebuilt);
        self.index_stale.store(false, Ordering::Release);

        info!("Rebuilt ANN index over {} vectors", count);
        Ok(count)
    }

    async fn current_index(&self) -> Result<Arc<AnnIndex>> {
        if !self.index_stale.load(Ordering::Acquire) {
            let existing = self.index.read().await.as_ref().map(Arc::clone);
            if let Some(index) = existing {
                return Ok(index);
            }
        }

        self.rebuild_index().await?;
        let rebuilt = self.index.read().await.as_ref().map(Arc::clone);
        rebuilt.ok_or_else(|| WebvecError::StorageUnavailable("ANN index unavailable".to_string()))
    }

    /// Periodic index upkeep. Runs until aborted; reads stay on the previous
    /// index during a rebuild, so staleness is bounded by `interval` plus one
    /// rebuild.
    #[inline]
    pub fn spawn_maintenance(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if store.index_stale.load(Ordering::Acquire) {
                    if let Err(e) = store.rebuild_index().await {
                        warn!("Background index rebuild failed: {}", e);
                    }
                }
            }
        })
    }

    fn validate_batch(&self, chunks: &[NewChunk]) -> Result<()> {
        for chunk in chunks {
            if chunk.embedding.len() != self.dimension {
                return Err(WebvecError::DimensionMismatch {
                    expected: self.dimension,
                    actual: chunk.embedding.len(),
                });
            }
        }
        Ok(())
    }
}

/// Deterministic result order: ascending distance, then ascending ordinal.
fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
}

fn storage_err(error: anyhow::Error) -> WebvecError {
    WebvecError::StorageUnavailable(error.to_string())
}
