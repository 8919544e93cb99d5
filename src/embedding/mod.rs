//! Embedding capability
//!
//! [`Embedder`] is the raw provider call: one request, no retries.
//! [`EmbedderClient`] wraps a provider with batching, retry/timeout,
//! and validation of the vector count and dimension.

pub mod ollama;
pub mod openai;

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use async_trait::async_trait;

use crate::config::{EmbeddingConfig, Provider};
use crate::errors::{Dependency, RagError, Result};
use crate::ingestion::normalizer::clean_for_embedding;
use crate::retry::RetryManager;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};

pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

/// Text to vector conversion provided by an external service
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Short provider name for logs and errors
    fn name(&self) -> &str;

    /// One vector per input, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Build the provider named in the configuration
pub fn build_embedder(config: &EmbeddingConfig, retry: &RetryManager) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.provider {
        Provider::Ollama => Arc::new(OllamaEmbedder::new(
            &config.url,
            &config.model,
            retry.call_timeout(),
        )?),
        Provider::OpenAi => Arc::new(OpenAiEmbedder::new(
            &config.url,
            &config.model,
            config.api_key.as_deref(),
            config.dimension,
            retry.call_timeout(),
        )?),
    };
    Ok(embedder)
}

/// Batched, retried and validated embedding calls
pub struct EmbedderClient {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    retry: RetryManager,
    dimension: OnceLock<usize>,
    telemetry: Option<TelemetryCollector>,
}

impl EmbedderClient {
    /// `dimension` fixes the expected vector length up front; when `None`
    /// the first successful response decides it
    pub fn new(
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        dimension: Option<usize>,
        retry: RetryManager,
    ) -> Self {
        let locked = OnceLock::new();
        if let Some(dim) = dimension {
            let _ = locked.set(dim);
        }
        Self {
            embedder,
            batch_size: batch_size.max(1),
            retry,
            dimension: locked,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Expected vector length, once known
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed texts in batches of at most `batch_size`, preserving order
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    /// Embed passage texts after embedding-only clean-up
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let cleaned: Vec<String> = texts.iter().map(|t| embedding_text(t)).collect();
        self.embed(&cleaned).await
    }

    /// Embed a single query
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[embedding_text(query)]).await?;
        vectors
            .pop()
            .ok_or_else(|| Dependency::Embedding.unavailable(1, "no vector returned for query"))
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let started = Instant::now();
        let vectors = self
            .retry
            .execute_with_retry(Dependency::Embedding, || self.embedder.embed(batch))
            .await?;

        if vectors.len() != batch.len() {
            return Err(Dependency::Embedding.unavailable(
                1,
                format!(
                    "{} returned {} vectors for {} inputs",
                    self.embedder.name(),
                    vectors.len(),
                    batch.len()
                ),
            ));
        }

        for vector in &vectors {
            self.check_vector(vector)?;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            provider = self.embedder.name(),
            inputs = batch.len(),
            duration_ms,
            "embedded batch"
        );
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(TelemetryEvent::BatchEmbedded {
                passages: batch.len(),
                duration_ms,
                timestamp: Instant::now(),
            });
        }

        Ok(vectors)
    }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(Dependency::Embedding.unavailable(
                1,
                format!("{} returned an empty vector", self.embedder.name()),
            ));
        }
        let expected = *self.dimension.get_or_init(|| vector.len());
        if vector.len() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Cleaned text, or the original when cleaning leaves nothing
fn embedding_text(text: &str) -> String {
    let cleaned = clean_for_embedding(text);
    if cleaned.is_empty() {
        text.to_string()
    } else {
        cleaned
    }
}
