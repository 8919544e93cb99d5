//! OpenAI-compatible embeddings (`POST {base}/embeddings`)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::errors::Result;
use crate::http::{build_client, check_status, endpoint};

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    /// `dimensions` is forwarded to models that support shortened vectors
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(api_key, timeout)?,
            endpoint: endpoint(base_url, "embeddings"),
            model: model.to_string(),
            dimensions,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

fn into_ordered(mut data: Vec<EmbeddingData>) -> Vec<Vec<f32>> {
    data.sort_by_key(|entry| entry.index);
    data.into_iter().map(|entry| entry.embedding).collect()
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let response = check_status(self.name(), response).await?;
        let parsed: EmbeddingResponse = response.json().await?;
        Ok(into_ordered(parsed.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_sorted_by_index() {
        let json = r#"{"data":[{"embedding":[2.0],"index":1},{"embedding":[1.0],"index":0}],"model":"m"}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(into_ordered(parsed.data), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_dimensions_omitted_when_unset() {
        let input = vec!["x".to_string()];
        let request = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: &input,
            dimensions: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("dimensions").is_none());
    }
}
