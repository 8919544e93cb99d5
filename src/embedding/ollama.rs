//! Ollama embeddings (`POST /api/embed`)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::errors::Result;
use crate::http::{build_client, check_status, endpoint};

/// Default Ollama embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(None, timeout)?,
            endpoint: endpoint(base_url, "api/embed"),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let response = check_status(self.name(), response).await?;
        let parsed: EmbedResponse = response.json().await?;
        Ok(parsed.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let input = vec!["a".to_string(), "b".to_string()];
        let request = EmbedRequest {
            model: "nomic-embed-text",
            input: &input,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["input"][1], "b");
        assert_eq!(json["model"], "nomic-embed-text");
    }

    #[tokio::test]
    #[ignore] // Integration test - requires Ollama
    async fn test_live_embed() {
        let embedder = OllamaEmbedder::new(
            "http://localhost:11434",
            DEFAULT_EMBEDDING_MODEL,
            Duration::from_secs(30),
        )
        .unwrap();
        let vectors = embedder.embed(&["battery life".to_string()]).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert!(!vectors[0].is_empty());
    }
}
