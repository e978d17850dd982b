
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::database::sqlite::Database;
use crate::database::sqlite::models::{NewProject, NewUrl, Project, UrlRecord, UrlStatus};
use crate::database::sqlite::queries::{ChunkQueries, ProjectQueries, UrlQueries};
use crate::database::vector::VectorStore;
use crate::{Result, WebvecError};

/// Outcome of a batch submission: which URLs were created and which already
/// existed in the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSubmitOutcome {
    pub submitted: Vec<UrlRecord>,
    pub duplicates: Vec<UrlRecord>,
}

/// Owns the URL state machine and the cascade rules that keep chunk storage
/// consistent with it: `pending → crawling → encoding → stored | failed`,
/// reprocessing purges chunks before returning to `pending`, and deletes
/// remove chunks before their owning rows.
pub struct LifecycleCoordinator {
    pool: sqlx::SqlitePool,
    store: Arc<VectorStore>,
}

impl LifecycleCoordinator {
    #[inline]
    pub fn new(database: &Database, store: Arc<VectorStore>) -> Self {
        Self {
            pool: database.pool().clone(),
            store,
        }
    }

    /// Create a project owned by `user_id`. Project names are unique per
    /// user; a clash fails rather than silently merging.
    #[inline]
    pub async fn create_project(&self, user_id: Uuid, project_name: &str) -> Result<Project> {
        let name = project_name.trim();
        if name.is_empty() || name.len() > 255 {
            return Err(WebvecError::InvalidArgument(
                "project name must be between 1 and 255 characters".to_string(),
            ));
        }

        if let Some(existing) = ProjectQueries::get_by_user_and_name(&self.pool, user_id, name)
            .await
            .map_err(storage_err)?
        {
            return Err(WebvecError::InvalidArgument(format!(
                "project '{}' already exists as {}",
                name, existing.project_id
            )));
        }

        let project = ProjectQueries::create(
            &self.pool,
            NewProject {
                user_id,
                project_name: name.to_string(),
            },
        )
        .await
        .map_err(storage_err)?;

        info!("Created project {} for user {}", project.project_id, user_id);
        Ok(project)
    }

    #[inline]
    pub async fn get_project(&self, project_id: Uuid) -> Result<Project> {
        ProjectQueries::get_by_id(&self.pool, project_id)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| WebvecError::NotFound(format!("project {} not found", project_id)))
    }

    /// Submit a URL into a project in `pending`. Duplicate submissions are
    /// rejected with the existing URL's identity so callers can surface a
    /// useful conflict instead of a bare error.
    #[inline]
    pub async fn submit(&self, project_id: Uuid, original_url: &str) -> Result<UrlRecord> {
        self.get_project(project_id).await?;
        let normalized = normalize_url(original_url)?;

        if let Some(existing) = UrlQueries::get_by_address(&self.pool, project_id, &normalized)
            .await
            .map_err(storage_err)?
        {
            return Err(WebvecError::Duplicate {
                url_id: existing.url_id,
                project_id: existing.project_id,
                last_updated_at: existing.last_updated_at,
            });
        }

        let url = UrlQueries::create(
            &self.pool,
            NewUrl {
                project_id,
                original_url: normalized,
            },
        )
        .await
        .map_err(storage_err)?;

        info!("Submitted url {} into project {}", url.url_id, project_id);
        Ok(url)
    }

    /// Submit many URLs at once. Duplicates don't fail the batch; they are
    /// reported alongside the created records.
    #[inline]
    pub async fn submit_batch(
        &self,
        project_id: Uuid,
        original_urls: &[String],
    ) -> Result<BatchSubmitOutcome> {
        self.get_project(project_id).await?;

        let mut outcome = BatchSubmitOutcome {
            submitted: Vec::new(),
            duplicates: Vec::new(),
        };

        for original_url in original_urls {
            match self.submit(project_id, original_url).await {
                Ok(url) => outcome.submitted.push(url),
                Err(WebvecError::Duplicate { url_id, .. }) => {
                    let existing = UrlQueries::get(&self.pool, url_id, project_id)
                        .await
                        .map_err(storage_err)?
                        .ok_or_else(|| {
                            WebvecError::NotFound(format!("URL {} not found", url_id))
                        })?;
                    outcome.duplicates.push(existing);
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Batch submit into project {}: {} created, {} duplicates",
            project_id,
            outcome.submitted.len(),
            outcome.duplicates.len()
        );
        Ok(outcome)
    }

    /// Tenant-scoped URL resolution for collaborators.
    #[inline]
    pub async fn resolve_url(&self, url_id: Uuid, project_id: Uuid) -> Result<UrlRecord> {
        UrlQueries::get(&self.pool, url_id, project_id)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| WebvecError::NotFound(format!("URL {} not found", url_id)))
    }

    #[inline]
    pub async fn list_urls(
        &self,
        project_id: Uuid,
        status: Option<UrlStatus>,
    ) -> Result<Vec<UrlRecord>> {
        UrlQueries::list_by_project(&self.pool, project_id, status)
            .await
            .map_err(storage_err)
    }

    /// `pending → crawling`: the crawl collaborator has picked the URL up.
    #[inline]
    pub async fn begin_crawling(&self, url_id: Uuid, project_id: Uuid) -> Result<UrlRecord> {
        self.transition(url_id, project_id, UrlStatus::Pending, UrlStatus::Crawling)
            .await
    }

    /// `crawling → encoding`: the fetch succeeded and chunk production began.
    #[inline]
    pub async fn begin_encoding(&self, url_id: Uuid, project_id: Uuid) -> Result<UrlRecord> {
        self.transition(url_id, project_id, UrlStatus::Crawling, UrlStatus::Encoding)
            .await
    }

    /// Fail a URL from any in-flight state, recording the reason for
    /// operators. Settled URLs can only change via `reprocess` or `delete`.
    #[inline]
    pub async fn mark_failed(
        &self,
        url_id: Uuid,
        project_id: Uuid,
        reason: &str,
    ) -> Result<UrlRecord> {
        let url = self.resolve_url(url_id, project_id).await?;

        let mut conn = self.pool.acquire().await?;
        let moved = UrlQueries::mark_failed_tx(&mut conn, url_id, reason)
            .await
            .map_err(storage_err)?;
        if !moved {
            return Err(WebvecError::InvalidState(format!(
                "URL {} is {} and cannot be failed",
                url_id, url.status
            )));
        }

        info!("Marked url {} failed: {}", url_id, reason);
        self.resolve_url(url_id, project_id).await
    }

    /// Return a stored or failed URL to `pending` for a fresh crawl. Existing
    /// chunks are purged in the same transaction so stale content is never
    /// served next to the new crawl's output.
    #[inline]
    pub async fn reprocess(&self, url_id: Uuid, project_id: Uuid) -> Result<UrlRecord> {
        let url = self.resolve_url(url_id, project_id).await?;
        if !url.status.is_reprocessable() {
            return Err(WebvecError::InvalidState(format!(
                "URL {} is {} and cannot be reprocessed",
                url_id, url.status
            )));
        }

        let mut tx = self.pool.begin().await?;
        let purged = ChunkQueries::delete_by_url_tx(&mut tx, url_id, project_id)
            .await
            .map_err(storage_err)?;
        let moved = UrlQueries::transition_tx(&mut tx, url_id, url.status, UrlStatus::Pending, None)
            .await
            .map_err(storage_err)?;
        if !moved {
            tx.rollback().await?;
            return Err(WebvecError::InvalidState(format!(
                "URL {} changed state during reprocess",
                url_id
            )));
        }
        tx.commit().await?;

        if purged > 0 {
            self.store.mark_index_stale();
        }

        info!("Reprocessing url {}: purged {} chunks", url_id, purged);
        self.resolve_url(url_id, project_id).await
    }

    /// Remove a URL and everything it owns. Chunks go first, then the row,
    /// in one transaction.
    #[inline]
    pub async fn delete(&self, url_id: Uuid, project_id: Uuid) -> Result<()> {
        self.resolve_url(url_id, project_id).await?;

        let mut tx = self.pool.begin().await?;
        let purged = ChunkQueries::delete_by_url_tx(&mut tx, url_id, project_id)
            .await
            .map_err(storage_err)?;
        UrlQueries::delete_tx(&mut tx, url_id)
            .await
            .map_err(storage_err)?;
        tx.commit().await?;

        if purged > 0 {
            self.store.mark_index_stale();
        }

        info!("Deleted url {} and {} chunks", url_id, purged);
        Ok(())
    }

    /// Remove a project and everything under it: chunks, then URLs, then the
    /// project row, in one transaction.
    #[inline]
    pub async fn delete_project(&self, project_id: Uuid) -> Result<()> {
        self.get_project(project_id).await?;

        let mut tx = self.pool.begin().await?;
        let purged_chunks = ChunkQueries::delete_by_project_tx(&mut tx, project_id)
            .await
            .map_err(storage_err)?;
        let purged_urls = UrlQueries::delete_by_project_tx(&mut tx, project_id)
            .await
            .map_err(storage_err)?;
        ProjectQueries::delete_tx(&mut tx, project_id)
            .await
            .map_err(storage_err)?;
        tx.commit().await?;

        if purged_chunks > 0 {
            self.store.mark_index_stale();
        }

        info!(
            "Deleted project {} with {} urls and {} chunks",
            project_id, purged_urls, purged_chunks
        );
        Ok(())
    }

    async fn transition(
        &self,
        url_id: Uuid,
        project_id: Uuid,
        from: UrlStatus,
        to: UrlStatus,
    ) -> Result<UrlRecord> {
        let url = self.resolve_url(url_id, project_id).await?;

        let mut conn = self.pool.acquire().await?;
        let moved = UrlQueries::transition_tx(&mut conn, url_id, from, to, None)
            .await
            .map_err(storage_err)?;
        if !moved {
            return Err(WebvecError::InvalidState(format!(
                "URL {} is {}, expected {}",
                url_id, url.status, from
            )));
        }

        debug!("URL {}: {} -> {}", url_id, from, to);
        self.resolve_url(url_id, project_id).await
    }
}

/// Canonical form of a submitted address. Parsing also rejects garbage input
/// before it reaches the unique constraint.
fn normalize_url(original_url: &str) -> Result<String> {
    let trimmed = original_url.trim();
    if trimmed.is_empty() {
        return Err(WebvecError::InvalidArgument(
            "URL must not be empty".to_string(),
        ));
    }

    let parsed = url::Url::parse(trimmed)
        .map_err(|e| WebvecError::InvalidArgument(format!("invalid URL '{}': {}", trimmed, e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(WebvecError::InvalidArgument(format!(
            "unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }

    Ok(parsed.to_string())
}

fn storage_err(error: anyhow::Error) -> WebvecError {
    WebvecError::StorageUnavailable(error.to_string())
}
