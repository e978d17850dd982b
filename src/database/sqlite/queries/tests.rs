use super::*;
use crate::database::sqlite::Database;
use tempfile::TempDir;

async fn create_test_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let database = Database::new(&db_path).await.expect("Failed to open database");
    let pool = database.pool().clone();

    (temp_dir, pool)
}

async fn create_project(pool: &SqlitePool) -> Project {
    ProjectQueries::create(
        pool,
        NewProject {
            user_id: Uuid::new_v4(),
            project_name: "research".to_string(),
        },
    )
    .await
    .expect("Failed to create project")
}

async fn create_url(pool: &SqlitePool, project_id: Uuid, address: &str) -> UrlRecord {
    UrlQueries::create(
        pool,
        NewUrl {
            project_id,
            original_url: address.to_string(),
        },
    )
    .await
    .expect("Failed to create URL")
}

fn sample_chunks(count: usize, dimension: usize) -> Vec<NewChunk> {
    (0..count)
        .map(|i| {
            let mut embedding = vec![0.0_f32; dimension];
            embedding[i % dimension] = 1.0;
            NewChunk::new(format!("chunk {}", i), embedding)
        })
        .collect()
}

#[tokio::test]
async fn project_crud_operations() {
    let (_temp_dir, pool) = create_test_pool().await;

    let project = create_project(&pool).await;
    assert_eq!(project.project_name, "research");

    let fetched = ProjectQueries::get_by_id(&pool, project.project_id)
        .await
        .expect("Failed to get project")
        .expect("Project should exist");
    assert_eq!(fetched, project);

    let by_name = ProjectQueries::get_by_user_and_name(&pool, project.user_id, "research")
        .await
        .expect("Failed to get project by name")
        .expect("Project should exist");
    assert_eq!(by_name.project_id, project.project_id);

    let listed = ProjectQueries::list_by_user(&pool, project.user_id)
        .await
        .expect("Failed to list projects");
    assert_eq!(listed.len(), 1);

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let deleted = ProjectQueries::delete_tx(&mut conn, project.project_id)
        .await
        .expect("Failed to delete project");
    assert!(deleted);

    assert!(
        ProjectQueries::get_by_id(&pool, project.project_id)
            .await
            .expect("Query should succeed")
            .is_none()
    );
}

#[tokio::test]
async fn url_create_and_tenant_scoped_get() {
    let (_temp_dir, pool) = create_test_pool().await;
    let project = create_project(&pool).await;

    let url = create_url(&pool, project.project_id, "https://example.com/a").await;
    assert_eq!(url.status, UrlStatus::Pending);
    assert!(url.failure_reason.is_none());

    let found = UrlQueries::get(&pool, url.url_id, project.project_id)
        .await
        .expect("Failed to get URL")
        .expect("URL should exist");
    assert_eq!(found.original_url, "https://example.com/a");

    // Same url_id under a different project is invisible
    let cross_tenant = UrlQueries::get(&pool, url.url_id, Uuid::new_v4())
        .await
        .expect("Query should succeed");
    assert!(cross_tenant.is_none());
}

#[tokio::test]
async fn url_unique_per_project() {
    let (_temp_dir, pool) = create_test_pool().await;
    let project = create_project(&pool).await;

    create_url(&pool, project.project_id, "https://example.com/a").await;

    let duplicate = UrlQueries::create(
        &pool,
        NewUrl {
            project_id: project.project_id,
            original_url: "https://example.com/a".to_string(),
        },
    )
    .await;
    assert!(duplicate.is_err());

    // The same address under another project is fine
    let other_project = ProjectQueries::create(
        &pool,
        NewProject {
            user_id: Uuid::new_v4(),
            project_name: "other".to_string(),
        },
    )
    .await
    .expect("Failed to create project");
    create_url(&pool, other_project.project_id, "https://example.com/a").await;
}

#[tokio::test]
async fn transition_is_compare_and_set() {
    let (_temp_dir, pool) = create_test_pool().await;
    let project = create_project(&pool).await;
    let url = create_url(&pool, project.project_id, "https://example.com/a").await;

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");

    let moved =
        UrlQueries::transition_tx(&mut conn, url.url_id, UrlStatus::Pending, UrlStatus::Crawling, None)
            .await
            .expect("Failed to transition");
    assert!(moved);

    // Stale transition from pending no longer applies
    let stale =
        UrlQueries::transition_tx(&mut conn, url.url_id, UrlStatus::Pending, UrlStatus::Crawling, None)
            .await
            .expect("Failed to transition");
    assert!(!stale);

    let current = UrlQueries::get_by_id(&pool, url.url_id)
        .await
        .expect("Failed to get URL")
        .expect("URL should exist");
    assert_eq!(current.status, UrlStatus::Crawling);
    assert!(current.last_updated_at >= url.last_updated_at);
}

#[tokio::test]
async fn mark_failed_only_from_in_flight_states() {
    let (_temp_dir, pool) = create_test_pool().await;
    let project = create_project(&pool).await;
    let url = create_url(&pool, project.project_id, "https://example.com/a").await;

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");

    let failed = UrlQueries::mark_failed_tx(&mut conn, url.url_id, "fetch timed out")
        .await
        .expect("Failed to mark failed");
    assert!(failed);

    let record = UrlQueries::get_by_id(&pool, url.url_id)
        .await
        .expect("Failed to get URL")
        .expect("URL should exist");
    assert_eq!(record.status, UrlStatus::Failed);
    assert_eq!(record.failure_reason.as_deref(), Some("fetch timed out"));

    // Already failed: a second mark is a no-op
    let again = UrlQueries::mark_failed_tx(&mut conn, url.url_id, "other reason")
        .await
        .expect("Failed to mark failed");
    assert!(!again);
}

#[tokio::test]
async fn chunk_batch_insert_assigns_ordinals() {
    let (_temp_dir, pool) = create_test_pool().await;
    let project = create_project(&pool).await;
    let url = create_url(&pool, project.project_id, "https://example.com/a").await;

    let batch = sample_chunks(3, 8);
    let mut tx = pool.begin().await.expect("Failed to begin transaction");
    let created = ChunkQueries::insert_batch_tx(&mut tx, url.url_id, project.project_id, &batch)
        .await
        .expect("Failed to insert batch");
    tx.commit().await.expect("Failed to commit");

    assert_eq!(created.len(), 3);

    let listed = ChunkQueries::list_by_url(&pool, url.url_id, project.project_id)
        .await
        .expect("Failed to list chunks");
    assert_eq!(listed.len(), 3);
    for (i, chunk) in listed.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i as i64);
        assert_eq!(chunk.content, format!("chunk {}", i));
        assert_eq!(chunk.embedding, batch[i].embedding);
    }
}

#[tokio::test]
async fn chunk_listing_is_tenant_scoped() {
    let (_temp_dir, pool) = create_test_pool().await;
    let project = create_project(&pool).await;
    let url = create_url(&pool, project.project_id, "https://example.com/a").await;

    let mut tx = pool.begin().await.expect("Failed to begin transaction");
    ChunkQueries::insert_batch_tx(&mut tx, url.url_id, project.project_id, &sample_chunks(2, 8))
        .await
        .expect("Failed to insert batch");
    tx.commit().await.expect("Failed to commit");

    // Right URL, wrong project: nothing
    let cross = ChunkQueries::list_by_url(&pool, url.url_id, Uuid::new_v4())
        .await
        .expect("Failed to list chunks");
    assert!(cross.is_empty());

    let refs = ChunkQueries::list_refs_by_url(&pool, url.url_id, project.project_id)
        .await
        .expect("Failed to list refs");
    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0].chunk_index, 0);
    assert_eq!(refs[1].chunk_index, 1);
}

#[tokio::test]
async fn delete_by_url_is_idempotent() {
    let (_temp_dir, pool) = create_test_pool().await;
    let project = create_project(&pool).await;
    let url = create_url(&pool, project.project_id, "https://example.com/a").await;

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");

    // No chunks yet: deleting succeeds silently
    let removed = ChunkQueries::delete_by_url_tx(&mut conn, url.url_id, project.project_id)
        .await
        .expect("Failed to delete chunks");
    assert_eq!(removed, 0);

    let mut tx = pool.begin().await.expect("Failed to begin transaction");
    ChunkQueries::insert_batch_tx(&mut tx, url.url_id, project.project_id, &sample_chunks(2, 8))
        .await
        .expect("Failed to insert batch");
    tx.commit().await.expect("Failed to commit");

    let removed = ChunkQueries::delete_by_url_tx(&mut conn, url.url_id, project.project_id)
        .await
        .expect("Failed to delete chunks");
    assert_eq!(removed, 2);

    let removed_again = ChunkQueries::delete_by_url_tx(&mut conn, url.url_id, project.project_id)
        .await
        .expect("Failed to delete chunks");
    assert_eq!(removed_again, 0);
}

#[tokio::test]
async fn list_embeddings_covers_all_urls() {
    let (_temp_dir, pool) = create_test_pool().await;
    let project = create_project(&pool).await;
    let url_a = create_url(&pool, project.project_id, "https://example.com/a").await;
    let url_b = create_url(&pool, project.project_id, "https://example.com/b").await;

    let mut tx = pool.begin().await.expect("Failed to begin transaction");
    ChunkQueries::insert_batch_tx(&mut tx, url_a.url_id, project.project_id, &sample_chunks(2, 4))
        .await
        .expect("Failed to insert batch");
    ChunkQueries::insert_batch_tx(&mut tx, url_b.url_id, project.project_id, &sample_chunks(3, 4))
        .await
        .expect("Failed to insert batch");
    tx.commit().await.expect("Failed to commit");

    let corpus = ChunkQueries::list_embeddings(&pool)
        .await
        .expect("Failed to list embeddings");
    assert_eq!(corpus.len(), 5);
    assert!(corpus.iter().all(|(_, embedding)| embedding.len() == 4));

    assert_eq!(
        ChunkQueries::count(&pool).await.expect("Failed to count"),
        5
    );
    assert_eq!(
        ChunkQueries::count_by_url(&pool, url_b.url_id, project.project_id)
            .await
            .expect("Failed to count"),
        3
    );
}
