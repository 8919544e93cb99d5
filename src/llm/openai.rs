//! OpenAI-compatible chat completions (`POST {base}/chat/completions`)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, GenerationRequest, Generator};
use crate::errors::Result;
use crate::http::{build_client, check_status, endpoint};

#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(base_url: &str, model: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(api_key, timeout)?,
            endpoint: endpoint(base_url, "chat/completions"),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_content(response: CompletionResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default()
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            messages: request.messages(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let response = check_status(self.name(), response).await?;
        let parsed: CompletionResponse = response.json().await?;
        Ok(first_content(parsed))
    }
}
