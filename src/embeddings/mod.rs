// Embedding collaborator boundary: the query engine and the ingest pipeline
// only see the trait; the Ollama client is the production implementation.

pub mod ollama;

use async_trait::async_trait;

use crate::Result;

/// External embedding model. Implementations convert text into fixed-length
/// vectors; latency and failure modes are opaque to callers, which surface
/// failures as `EmbeddingUnavailable`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub use ollama::OllamaClient;
