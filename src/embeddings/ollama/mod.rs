
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::WebvecError;
use crate::config::Config;
use crate::embeddings::EmbeddingProvider;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for an Ollama-compatible embedding endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    client: reqwest::Client,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    model: String,
    #[serde(rename = "input")]
    inputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .embedder_url()
            .context("Failed to build embedder URL from config")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            model: config.embedder.model.clone(),
            batch_size: config.embedder.batch_size,
            client,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(self)
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Check that the server responds and the configured model is installed.
    #[inline]
    pub async fn health_check(&self) -> Result<()> {
        debug!("Performing health check for embedder at {}", self.base_url);

        self.ping().await.context("Server ping failed")?;
        self.validate_model()
            .await
            .context("Model validation failed")?;

        debug!(
            "Health check passed for embedder at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    #[inline]
    pub async fn ping(&self) -> Result<()> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build ping URL")?;

        self.request_with_retry(|| self.client.get(url.clone()).send())
            .await
            .context("Failed to ping embedder")?;

        debug!("Server ping successful");
        Ok(())
    }

    #[inline]
    pub async fn validate_model(&self) -> Result<()> {
        let models = self.list_models().await.context("Failed to list models")?;

        if models.iter().any(|m| m.name == self.model) {
            debug!("Model {} is available", self.model);
            Ok(())
        } else {
            let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available
            );
            Err(anyhow!(
                "Model '{}' is not available. Available models: {:?}",
                self.model,
                available
            ))
        }
    }

    #[inline]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        let response = self
            .request_with_retry(|| self.client.get(url.clone()).send())
            .await
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse = response
            .json()
            .await
            .context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;
        let request = EmbedRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .request_with_retry(|| self.client.post(url.clone()).json(&request).send())
            .await
            .context("Failed to generate embedding")?;

        let embed_response: EmbedResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        debug!(
            "Generated embedding with {} dimensions",
            embed_response.embedding.len()
        );
        Ok(embed_response.embedding)
    }

    async fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(texts.len());

        // Cap request sizes so one page of chunks cannot overload the server
        for batch in texts.chunks(self.batch_size as usize) {
            let batch_results = self
                .generate_single_batch(batch)
                .await
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            results.extend(batch_results);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    async fn generate_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.len() == 1 {
            let embedding = self.generate_embedding(&texts[0]).await?;
            return Ok(vec![embedding]);
        }

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build batch embedding URL")?;
        let request = BatchEmbedRequest {
            model: self.model.clone(),
            inputs: texts.to_vec(),
        };

        let response = self
            .request_with_retry(|| self.client.post(url.clone()).json(&request).send())
            .await
            .context("Failed to generate batch embeddings")?;

        let batch_response: BatchEmbedResponse = response
            .json()
            .await
            .context("Failed to parse batch embedding response")?;

        if batch_response.embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                batch_response.embeddings.len()
            ));
        }

        Ok(batch_response.embeddings)
    }

    async fn request_with_retry<F, Fut>(&self, mut request_fn: F) -> Result<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status.is_server_error() {
                        warn!(
                            "Server error (status {}), attempt {}/{}",
                            status, attempt, self.retry_attempts
                        );
                        last_error = Some(anyhow!("Server error: HTTP {}", status));
                    } else {
                        warn!("Client error (status {}), not retrying", status);
                        return Err(anyhow!("Client error: HTTP {}", status));
                    }
                }
                Err(error) => {
                    if error.is_timeout() || error.is_connect() || error.is_request() {
                        warn!(
                            "Transport error: {}, attempt {}/{}",
                            error, attempt, self.retry_attempts
                        );
                        last_error = Some(anyhow!("Request error: {}", error));
                    } else {
                        warn!("Non-retryable error: {}", error);
                        return Err(anyhow!("Non-retryable error: {}", error));
                    }
                }
            }

            if attempt < self.retry_attempts {
                let delay = Duration::from_millis(EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000);
                debug!("Waiting {:?} before retry", delay);
                tokio::time::sleep(delay).await;
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);
        Err(last_error.unwrap_or_else(|| anyhow!("Request failed after retries")))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    #[inline]
    async fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
        self.generate_embedding(text)
            .await
            .map_err(|e| WebvecError::EmbeddingUnavailable(e.to_string()))
    }

    #[inline]
    async fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        self.generate_embeddings_batch(texts)
            .await
            .map_err(|e| WebvecError::EmbeddingUnavailable(e.to_string()))
    }
}
