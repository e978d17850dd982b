use super::*;
use tempfile::TempDir;

#[tokio::test]
async fn creates_database_and_runs_migrations() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("webvec.db");

    let database = Database::new(&db_path).await.expect("Failed to open database");

    // Migrations are idempotent
    database
        .run_migrations()
        .await
        .expect("Re-running migrations should succeed");

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
    )
    .fetch_all(database.pool())
    .await
    .expect("Failed to list tables");

    assert!(tables.contains(&"projects".to_string()));
    assert!(tables.contains(&"urls".to_string()));
    assert!(tables.contains(&"chunks".to_string()));
}

#[tokio::test]
async fn optimize_succeeds_on_fresh_database() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("webvec.db");

    let database = Database::new(&db_path).await.expect("Failed to open database");
    database.optimize().await.expect("Failed to optimize");
}
