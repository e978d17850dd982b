use std::path::PathBuf;

use clap::{Parser, Subcommand};
use webvec::Result;
use webvec::commands::{init, rebuild_index, show_status};
use webvec::config::Config;

#[derive(Parser)]
#[command(name = "webvec")]
#[command(about = "Web-content vectorization core: chunk storage and similarity search")]
#[command(version)]
struct Cli {
    /// Override the config directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config and initialize the database schema
    Init,
    /// Show storage counters
    Status,
    /// Rebuild the ANN index from the canonical chunk table
    Reindex,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match cli.config_dir {
        Some(dir) => Config::load(dir)?,
        None => Config::load_default()?,
    };

    match cli.command {
        Commands::Init => init(&config).await?,
        Commands::Status => show_status(&config).await?,
        Commands::Reindex => rebuild_index(&config).await?,
    }

    Ok(())
}
