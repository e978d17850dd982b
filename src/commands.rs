use anyhow::Context;
use tracing::info;

use crate::Result;
use crate::config::Config;
use crate::database::sqlite::Database;
use crate::database::sqlite::queries::{ChunkQueries, ProjectQueries, UrlQueries};
use crate::database::vector::VectorStore;

/// Create the config directory, write the default config if none exists, and
/// initialize the database schema.
#[inline]
pub async fn init(config: &Config) -> Result<()> {
    if !config.base_dir.join("config.toml").exists() {
        config.save()?;
        println!("Wrote default config to {}", config.base_dir.display());
    }

    let database = Database::new(config.database_path())
        .await
        .context("Failed to initialize database")?;
    database.run_migrations().await?;

    println!("Database ready at {}", config.database_path().display());
    Ok(())
}

/// Print storage counters.
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    let database = Database::new(config.database_path())
        .await
        .context("Failed to open database")?;
    let pool = database.pool();

    let projects = ProjectQueries::count(pool).await?;
    let urls = UrlQueries::count(pool).await?;
    let chunks = ChunkQueries::count(pool).await?;

    println!("Database: {}", config.database_path().display());
    println!("Projects: {}", projects);
    println!("URLs:     {}", urls);
    println!("Chunks:   {}", chunks);
    println!(
        "Vectors:  {} dims, {} metric",
        config.vector.dimension, config.vector.metric
    );
    Ok(())
}

/// Rebuild the ANN index from the canonical chunk table.
#[inline]
pub async fn rebuild_index(config: &Config) -> Result<()> {
    let database = Database::new(config.database_path())
        .await
        .context("Failed to open database")?;
    let store = VectorStore::new(&database, &config.vector);

    info!("Rebuilding ANN index");
    let count = store.rebuild_index().await?;

    println!("Rebuilt index over {} vectors", count);
    Ok(())
}
