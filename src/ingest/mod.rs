
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::sqlite::Database;
use crate::database::sqlite::models::{Chunk, NewChunk, UrlStatus};
use crate::database::sqlite::queries::{ChunkQueries, UrlQueries};
use crate::database::vector::VectorStore;
use crate::{Result, WebvecError};

/// Keyed mutual exclusion so at most one ingest runs per URL at a time.
/// Ingests for different URLs proceed concurrently.
#[derive(Default)]
struct UrlLocks {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UrlLocks {
    async fn acquire(&self, url_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(url_id).or_default())
        };
        lock.lock_owned().await
    }
}

/// Bridge between the external crawl/embed pipeline and the vector store.
///
/// Couples chunk writing to the URL lifecycle: a batch lands only while the
/// URL is in `encoding`, and the chunk insert and the `encoding → stored`
/// flip commit in one transaction. A crash or cancellation mid-ingest leaves
/// the URL in `encoding`, safe to retry, never `stored` with missing chunks.
pub struct IngestWriter {
    pool: sqlx::SqlitePool,
    store: Arc<VectorStore>,
    locks: UrlLocks,
}

impl IngestWriter {
    #[inline]
    pub fn new(database: &Database, store: Arc<VectorStore>) -> Self {
        Self {
            pool: database.pool().clone(),
            store,
            locks: UrlLocks::default(),
        }
    }

    /// Persist a freshly produced chunk batch for one URL.
    ///
    /// On a dimension error the whole batch is rejected, nothing is written,
    /// and the URL is moved to `failed` with the reason recorded so operators
    /// can see why the URL never completed.
    #[inline]
    pub async fn ingest(
        &self,
        url_id: Uuid,
        project_id: Uuid,
        chunks: &[NewChunk],
    ) -> Result<Vec<Chunk>> {
        let _guard = self.locks.acquire(url_id).await;

        let url = UrlQueries::get(&self.pool, url_id, project_id)
            .await
            .map_err(|e| WebvecError::StorageUnavailable(e.to_string()))?
            .ok_or_else(|| WebvecError::NotFound(format!("URL {} not found", url_id)))?;

        if url.status != UrlStatus::Encoding {
            return Err(WebvecError::InvalidState(format!(
                "URL {} is {}, chunks can only be written while encoding",
                url_id, url.status
            )));
        }

        if chunks.is_empty() {
            return Err(WebvecError::EmptyBatch);
        }

        if let Err(e) = self.validate_dimensions(chunks) {
            self.record_failure(url_id, &e).await;
            return Err(e);
        }

        let mut tx = self.pool.begin().await?;
        let created = ChunkQueries::insert_batch_tx(&mut tx, url_id, project_id, chunks)
            .await
            .map_err(|e| WebvecError::StorageUnavailable(e.to_string()))?;
        let flipped = UrlQueries::transition_tx(
            &mut tx,
            url_id,
            UrlStatus::Encoding,
            UrlStatus::Stored,
            None,
        )
        .await
        .map_err(|e| WebvecError::StorageUnavailable(e.to_string()))?;

        if !flipped {
            // Lifecycle moved the URL underneath us; keep nothing.
            tx.rollback().await?;
            return Err(WebvecError::InvalidState(format!(
                "URL {} left encoding during ingest",
                url_id
            )));
        }

        tx.commit().await?;
        self.store.mark_index_stale();

        info!("Ingested {} chunks for url {}", created.len(), url_id);
        Ok(created)
    }

    fn validate_dimensions(&self, chunks: &[NewChunk]) -> Result<()> {
        let expected = self.store.dimension();
        for chunk in chunks {
            if chunk.embedding.len() != expected {
                return Err(WebvecError::DimensionMismatch {
                    expected,
                    actual: chunk.embedding.len(),
                });
            }
        }
        Ok(())
    }

    async fn record_failure(&self, url_id: Uuid, error: &WebvecError) {
        let reason = error.to_string();
        match self.pool.acquire().await {
            Ok(mut conn) => {
                if let Err(e) = UrlQueries::mark_failed_tx(&mut conn, url_id, &reason).await {
                    warn!("Failed to record ingest failure for url {}: {}", url_id, e);
                }
            }
            Err(e) => warn!(
                "Failed to acquire connection to record ingest failure for url {}: {}",
                url_id, e
            ),
        }
    }
}
