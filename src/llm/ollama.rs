//! Ollama chat completions (`POST /api/chat`, non-streaming)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, GenerationRequest, Generator};
use crate::errors::Result;
use crate::http::{build_client, check_status, endpoint};

#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(None, timeout)?,
            endpoint: endpoint(base_url, "api/chat"),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: request.messages(),
            stream: false,
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let response = check_status(self.name(), response).await?;
        let parsed: ChatResponse = response.json().await?;
        Ok(parsed.message.content)
    }
}
