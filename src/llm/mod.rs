//! Generation capability
//!
//! [`Generator`] is one raw, non-streaming chat call. Retry, timeout and
//! empty-output handling live in the answer orchestrator.

pub mod ollama;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{GenerationConfig, Provider};
use crate::errors::Result;
use crate::retry::RetryManager;

pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;

/// Everything a generator needs for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Chat message in the shape both providers accept
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl GenerationRequest {
    pub(crate) fn messages(&self) -> Vec<ChatMessage<'_>> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &self.prompt,
        });
        messages
    }
}

/// Text generation provided by an external model
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short provider name for logs and errors
    fn name(&self) -> &str;

    /// Raw model reply
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Build the provider named in the configuration
pub fn build_generator(config: &GenerationConfig, retry: &RetryManager) -> Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match config.provider {
        Provider::Ollama => Arc::new(OllamaGenerator::new(
            &config.url,
            &config.model,
            retry.call_timeout(),
        )?),
        Provider::OpenAi => Arc::new(OpenAiGenerator::new(
            &config.url,
            &config.model,
            config.api_key.as_deref(),
            retry.call_timeout(),
        )?),
    };
    Ok(generator)
}
