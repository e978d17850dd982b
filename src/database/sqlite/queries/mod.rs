#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::models::{
    Chunk, ChunkRef, ChunkRow, NewChunk, NewProject, NewUrl, Project, UrlRecord, UrlStatus,
    decode_embedding, encode_embedding,
};

pub struct ProjectQueries;

impl ProjectQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_project: NewProject) -> Result<Project> {
        let project = Project {
            project_id: Uuid::new_v4(),
            user_id: new_project.user_id,
            project_name: new_project.project_name,
            created_at: Utc::now().naive_utc(),
        };

        sqlx::query(
            "INSERT INTO projects (project_id, user_id, project_name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(project.project_id)
        .bind(project.user_id)
        .bind(&project.project_name)
        .bind(project.created_at)
        .execute(pool)
        .await
        .context("Failed to create project")?;

        Ok(project)
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, project_id: Uuid) -> Result<Option<Project>> {
        sqlx::query_as::<_, Project>(
            "SELECT project_id, user_id, project_name, created_at FROM projects WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get project by id")
    }

    #[inline]
    pub async fn get_by_user_and_name(
        pool: &SqlitePool,
        user_id: Uuid,
        project_name: &str,
    ) -> Result<Option<Project>> {
        sqlx::query_as::<_, Project>(
            "SELECT project_id, user_id, project_name, created_at FROM projects \
             WHERE user_id = ? AND project_name = ?",
        )
        .bind(user_id)
        .bind(project_name)
        .fetch_optional(pool)
        .await
        .context("Failed to get project by user and name")
    }

    #[inline]
    pub async fn list_by_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Project>> {
        sqlx::query_as::<_, Project>(
            "SELECT project_id, user_id, project_name, created_at FROM projects \
             WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list projects by user")
    }

    #[inline]
    pub async fn delete_tx(conn: &mut SqliteConnection, project_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE project_id = ?")
            .bind(project_id)
            .execute(conn)
            .await
            .context("Failed to delete project")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects")
            .fetch_one(pool)
            .await
            .context("Failed to count projects")
    }
}

pub struct UrlQueries;

impl UrlQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_url: NewUrl) -> Result<UrlRecord> {
        let mut conn = pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        Self::create_tx(&mut conn, new_url).await
    }

    #[inline]
    pub async fn create_tx(conn: &mut SqliteConnection, new_url: NewUrl) -> Result<UrlRecord> {
        let now = Utc::now().naive_utc();
        let url = UrlRecord {
            url_id: Uuid::new_v4(),
            project_id: new_url.project_id,
            original_url: new_url.original_url,
            status: UrlStatus::Pending,
            failure_reason: None,
            submitted_at: now,
            last_updated_at: now,
        };

        sqlx::query(
            "INSERT INTO urls (url_id, project_id, original_url, status, failure_reason, submitted_at, last_updated_at) \
             VALUES (?, ?, ?, ?, NULL, ?, ?)",
        )
        .bind(url.url_id)
        .bind(url.project_id)
        .bind(&url.original_url)
        .bind(url.status)
        .bind(url.submitted_at)
        .bind(url.last_updated_at)
        .execute(conn)
        .await
        .context("Failed to create URL")?;

        Ok(url)
    }

    /// Tenant-scoped lookup: both keys must match or the URL is not visible.
    #[inline]
    pub async fn get(
        pool: &SqlitePool,
        url_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<UrlRecord>> {
        sqlx::query_as::<_, UrlRecord>(
            "SELECT url_id, project_id, original_url, status, failure_reason, submitted_at, last_updated_at \
             FROM urls WHERE url_id = ? AND project_id = ?",
        )
        .bind(url_id)
        .bind(project_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get URL")
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, url_id: Uuid) -> Result<Option<UrlRecord>> {
        sqlx::query_as::<_, UrlRecord>(
            "SELECT url_id, project_id, original_url, status, failure_reason, submitted_at, last_updated_at \
             FROM urls WHERE url_id = ?",
        )
        .bind(url_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get URL by id")
    }

    #[inline]
    pub async fn get_by_address(
        pool: &SqlitePool,
        project_id: Uuid,
        original_url: &str,
    ) -> Result<Option<UrlRecord>> {
        sqlx::query_as::<_, UrlRecord>(
            "SELECT url_id, project_id, original_url, status, failure_reason, submitted_at, last_updated_at \
             FROM urls WHERE project_id = ? AND original_url = ?",
        )
        .bind(project_id)
        .bind(original_url)
        .fetch_optional(pool)
        .await
        .context("Failed to get URL by address")
    }

    #[inline]
    pub async fn list_by_project(
        pool: &SqlitePool,
        project_id: Uuid,
        status: Option<UrlStatus>,
    ) -> Result<Vec<UrlRecord>> {
        let urls = match status {
            Some(status) => {
                sqlx::query_as::<_, UrlRecord>(
                    "SELECT url_id, project_id, original_url, status, failure_reason, submitted_at, last_updated_at \
                     FROM urls WHERE project_id = ? AND status = ? ORDER BY submitted_at ASC",
                )
                .bind(project_id)
                .bind(status)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, UrlRecord>(
                    "SELECT url_id, project_id, original_url, status, failure_reason, submitted_at, last_updated_at \
                     FROM urls WHERE project_id = ? ORDER BY submitted_at ASC",
                )
                .bind(project_id)
                .fetch_all(pool)
                .await
            }
        };

        urls.context("Failed to list URLs by project")
    }

    /// Compare-and-set transition. Returns false when the URL is missing or
    /// not currently in `from`, leaving the row untouched.
    #[inline]
    pub async fn transition_tx(
        conn: &mut SqliteConnection,
        url_id: Uuid,
        from: UrlStatus,
        to: UrlStatus,
        failure_reason: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            "UPDATE urls SET status = ?, failure_reason = ?, last_updated_at = ? \
             WHERE url_id = ? AND status = ?",
        )
        .bind(to)
        .bind(failure_reason)
        .bind(now)
        .bind(url_id)
        .bind(from)
        .execute(conn)
        .await
        .context("Failed to transition URL status")?;

        Ok(result.rows_affected() > 0)
    }

    /// Fails a URL from any in-flight state, recording the reason. Returns
    /// false when the URL is missing or already settled.
    #[inline]
    pub async fn mark_failed_tx(
        conn: &mut SqliteConnection,
        url_id: Uuid,
        reason: &str,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            "UPDATE urls SET status = ?, failure_reason = ?, last_updated_at = ? \
             WHERE url_id = ? AND status IN ('pending', 'crawling', 'encoding')",
        )
        .bind(UrlStatus::Failed)
        .bind(reason)
        .bind(now)
        .bind(url_id)
        .execute(conn)
        .await
        .context("Failed to mark URL failed")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn delete_tx(conn: &mut SqliteConnection, url_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM urls WHERE url_id = ?")
            .bind(url_id)
            .execute(conn)
            .await
            .context("Failed to delete URL")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn delete_by_project_tx(conn: &mut SqliteConnection, project_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM urls WHERE project_id = ?")
            .bind(project_id)
            .execute(conn)
            .await
            .context("Failed to delete URLs by project")?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM urls")
            .fetch_one(pool)
            .await
            .context("Failed to count URLs")
    }
}

/// Row shape for streaming the full embedding corpus into an index rebuild.
#[derive(Debug, Clone, FromRow)]
struct EmbeddingRow {
    chunk_id: Uuid,
    embedding: Vec<u8>,
}

pub struct ChunkQueries;

impl ChunkQueries {
    /// Inserts an ordered batch of chunks for one URL, assigning ordinals
    /// 0..N-1 from batch position. Must run inside the caller's transaction so
    /// the batch becomes visible only as a whole.
    #[inline]
    pub async fn insert_batch_tx(
        conn: &mut SqliteConnection,
        url_id: Uuid,
        project_id: Uuid,
        chunks: &[NewChunk],
    ) -> Result<Vec<Chunk>> {
        let now = Utc::now().naive_utc();
        let mut created = Vec::with_capacity(chunks.len());

        for (ordinal, chunk) in chunks.iter().enumerate() {
            let chunk_id = Uuid::new_v4();
            let chunk_index = i64::try_from(ordinal).context("Chunk ordinal overflow")?;

            sqlx::query(
                "INSERT INTO chunks (chunk_id, url_id, project_id, content, chunk_index, embedding, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(chunk_id)
            .bind(url_id)
            .bind(project_id)
            .bind(&chunk.content)
            .bind(chunk_index)
            .bind(encode_embedding(&chunk.embedding))
            .bind(now)
            .execute(&mut *conn)
            .await
            .context("Failed to insert chunk in batch")?;

            created.push(Chunk {
                chunk_id,
                url_id,
                project_id,
                content: chunk.content.clone(),
                chunk_index,
                embedding: chunk.embedding.clone(),
                created_at: now,
            });
        }

        debug!("Inserted {} chunks for url {}", created.len(), url_id);
        Ok(created)
    }

    #[inline]
    pub async fn list_by_url(
        pool: &SqlitePool,
        url_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<Chunk>> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            "SELECT chunk_id, url_id, project_id, content, chunk_index, embedding, created_at \
             FROM chunks WHERE url_id = ? AND project_id = ? ORDER BY chunk_index ASC",
        )
        .bind(url_id)
        .bind(project_id)
        .fetch_all(pool)
        .await
        .context("Failed to list chunks by URL")?;

        rows.into_iter().map(Chunk::try_from).collect()
    }

    #[inline]
    pub async fn list_refs_by_url(
        pool: &SqlitePool,
        url_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<ChunkRef>> {
        sqlx::query_as::<_, ChunkRef>(
            "SELECT chunk_id, chunk_index FROM chunks \
             WHERE url_id = ? AND project_id = ? ORDER BY chunk_index ASC",
        )
        .bind(url_id)
        .bind(project_id)
        .fetch_all(pool)
        .await
        .context("Failed to list chunk refs by URL")
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, chunk_id: Uuid) -> Result<Option<Chunk>> {
        let row = sqlx::query_as::<_, ChunkRow>(
            "SELECT chunk_id, url_id, project_id, content, chunk_index, embedding, created_at \
             FROM chunks WHERE chunk_id = ?",
        )
        .bind(chunk_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get chunk by id")?;

        row.map(Chunk::try_from).transpose()
    }

    #[inline]
    pub async fn delete_by_url_tx(
        conn: &mut SqliteConnection,
        url_id: Uuid,
        project_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE url_id = ? AND project_id = ?")
            .bind(url_id)
            .bind(project_id)
            .execute(conn)
            .await
            .context("Failed to delete chunks by URL")?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn delete_by_project_tx(
        conn: &mut SqliteConnection,
        project_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE project_id = ?")
            .bind(project_id)
            .execute(conn)
            .await
            .context("Failed to delete chunks by project")?;

        Ok(result.rows_affected())
    }

    #[inline]
    pub async fn count_by_url(pool: &SqlitePool, url_id: Uuid, project_id: Uuid) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM chunks WHERE url_id = ? AND project_id = ?",
        )
        .bind(url_id)
        .bind(project_id)
        .fetch_one(pool)
        .await
        .context("Failed to count chunks by URL")
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunks")
            .fetch_one(pool)
            .await
            .context("Failed to count chunks")
    }

    /// Full (chunk_id, embedding) corpus, decoded, for index rebuilds.
    #[inline]
    pub async fn list_embeddings(pool: &SqlitePool) -> Result<Vec<(Uuid, Vec<f32>)>> {
        let rows = sqlx::query_as::<_, EmbeddingRow>("SELECT chunk_id, embedding FROM chunks")
            .fetch_all(pool)
            .await
            .context("Failed to list chunk embeddings")?;

        rows.into_iter()
            .map(|row| {
                let embedding = decode_embedding(&row.embedding)
                    .map_err(|e| anyhow!("Corrupt embedding for chunk {}: {}", row.chunk_id, e))?;
                Ok((row.chunk_id, embedding))
            })
            .collect()
    }
}
