//! Configuration management for reviewrag
//!
//! Provides TOML-based configuration with defaults, environment overrides
//! and validation.
//! Location: ~/.reviewrag/config.toml

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{RagError, Result};
use crate::rag::answer::{prompt_overhead, MIN_QUERY_CHARS};
use crate::rag::context::ENTRY_HEADER_CHARS;
use crate::retry::RetryConfig;
use crate::store::Metric;

/// Complete configuration for reviewrag
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    pub ingest: IngestConfig,
    pub retry: RetryConfig,
}

/// Wire protocol spoken by an embedding or generation endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
}

impl FromStr for Provider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" | "open-ai" | "openai-compatible" => Ok(Provider::OpenAi),
            other => Err(RagError::ConfigError(format!(
                "Unknown provider '{}' (expected 'ollama' or 'openai')",
                other
            ))),
        }
    }
}

/// Vector store connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub metric: Metric,
}

/// Embedding endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: Provider,
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Expected vector length; locked by the first response when unset
    pub dimension: Option<usize>,
    pub batch_size: usize,
}

/// Generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: Provider,
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_prompt_chars: usize,
}

/// Passage splitting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chunk_length: usize,
    pub overlap: usize,
}

/// Query-time retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Results scoring below this are dropped; off when unset
    pub min_score: Option<f32>,
    /// Candidates fetched per requested result, so ties at the cut are
    /// broken locally
    pub candidate_multiplier: usize,
}

/// Context assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_context_chars: usize,
    pub per_record_cap: usize,
    pub redact_pii: bool,
}

/// Ingestion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub write_batch_size: usize,
    /// Concurrent batches; number of CPUs when unset
    pub workers: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "reviews".to_string(),
            metric: Metric::Cosine,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
            dimension: None,
            batch_size: 32,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            api_key: None,
            temperature: 0.2,
            max_tokens: 512,
            max_prompt_chars: 12_000,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: 500,
            overlap: 0,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: None,
            candidate_multiplier: 2,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 6_000,
            per_record_cap: 2,
            redact_pii: true,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            write_batch_size: 64,
            workers: None,
        }
    }
}

impl IngestConfig {
    /// Effective worker count, never below one
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

impl Config {
    /// Load configuration from file (or the default location), then apply
    /// environment overrides and validate
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = match path {
            Some(config_path) => Self::read_file(&config_path)?,
            None => Self::read_default()?,
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file without environment overrides
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RagError::ConfigError(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents)
            .map_err(|e| RagError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    fn read_default() -> Result<Self> {
        match Self::default_path() {
            Some(config_path) if config_path.exists() => Self::read_file(&config_path),
            _ => Ok(Config::default()),
        }
    }

    /// Standard configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".reviewrag").join("config.toml"))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// A value that fails to parse is an error: `ChunkConfig` for the
    /// chunking variables, `ConfigError` for the rest.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("QDRANT_URL") {
            self.store.url = v;
        }
        if let Some(v) = get("QDRANT_API_KEY") {
            self.store.api_key = Some(v);
        }
        if let Some(v) = get("QDRANT_COLLECTION") {
            self.store.collection = v;
        }

        if let Some(v) = get("REVIEWRAG_EMBEDDING_PROVIDER") {
            self.embedding.provider = v.parse()?;
        }
        if let Some(v) = get("REVIEWRAG_EMBEDDING_URL") {
            self.embedding.url = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }

        if let Some(v) = get("REVIEWRAG_LLM_PROVIDER") {
            self.generation.provider = v.parse()?;
        }
        if let Some(v) = get("OLLAMA_URL") {
            // Both endpoints default to the local Ollama server
            if self.generation.provider == Provider::Ollama {
                self.generation.url = v.clone();
            }
            if self.embedding.provider == Provider::Ollama && get("REVIEWRAG_EMBEDDING_URL").is_none() {
                self.embedding.url = v;
            }
        }
        if let Some(v) = get("LLM_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            if self.generation.provider == Provider::OpenAi {
                self.generation.api_key = Some(v.clone());
            }
            if self.embedding.provider == Provider::OpenAi {
                self.embedding.api_key = Some(v);
            }
        }

        if let Some(v) = get("CHUNK_MAX_LENGTH") {
            self.chunking.max_chunk_length = parse_env(&v, "CHUNK_MAX_LENGTH", RagError::ChunkConfig)?;
        }
        if let Some(v) = get("CHUNK_OVERLAP") {
            self.chunking.overlap = parse_env(&v, "CHUNK_OVERLAP", RagError::ChunkConfig)?;
        }
        if let Some(v) = get("TOP_K") {
            self.retrieval.top_k = parse_env(&v, "TOP_K", RagError::ConfigError)?;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_chunk_length == 0 {
            return Err(RagError::ChunkConfig(
                "max_chunk_length must be greater than 0".to_string(),
            ));
        }

        if self.chunking.overlap >= self.chunking.max_chunk_length {
            return Err(RagError::ChunkConfig(format!(
                "overlap ({}) must be less than max_chunk_length ({})",
                self.chunking.overlap, self.chunking.max_chunk_length
            )));
        }

        if self.store.collection.trim().is_empty() {
            return Err(RagError::ConfigError(
                "store.collection must not be empty".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(RagError::ConfigError(
                "embedding.batch_size must be greater than 0".to_string(),
            ));
        }

        if self.embedding.dimension == Some(0) {
            return Err(RagError::ConfigError(
                "embedding.dimension must be greater than 0".to_string(),
            ));
        }

        if self.ingest.write_batch_size == 0 {
            return Err(RagError::ConfigError(
                "ingest.write_batch_size must be greater than 0".to_string(),
            ));
        }

        if self.ingest.workers == Some(0) {
            return Err(RagError::ConfigError(
                "ingest.workers must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.candidate_multiplier == 0 {
            return Err(RagError::ConfigError(
                "retrieval.candidate_multiplier must be greater than 0".to_string(),
            ));
        }

        if self.context.max_context_chars == 0 {
            return Err(RagError::ConfigError(
                "context.max_context_chars must be greater than 0".to_string(),
            ));
        }

        if self.context.per_record_cap == 0 {
            return Err(RagError::ConfigError(
                "context.per_record_cap must be greater than 0".to_string(),
            ));
        }

        if self.chunking.max_chunk_length + ENTRY_HEADER_CHARS > self.context.max_context_chars {
            return Err(RagError::ConfigError(format!(
                "context.max_context_chars ({}) cannot hold one passage of max_chunk_length ({}) plus its header",
                self.context.max_context_chars, self.chunking.max_chunk_length
            )));
        }

        let min_prompt = self.context.max_context_chars + prompt_overhead() + MIN_QUERY_CHARS;
        if self.generation.max_prompt_chars < min_prompt {
            return Err(RagError::ConfigError(format!(
                "generation.max_prompt_chars ({}) must be at least {}: the full context, the prompt template and {} query characters",
                self.generation.max_prompt_chars, min_prompt, MIN_QUERY_CHARS
            )));
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(RagError::ConfigError(format!(
                "generation.temperature must be between 0.0 and 2.0, got {}",
                self.generation.temperature
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(RagError::ConfigError(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::ConfigError(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| RagError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Render as TOML with secrets masked
    pub fn to_display_toml(&self) -> Result<String> {
        let mut masked = self.clone();
        for key in [
            &mut masked.store.api_key,
            &mut masked.embedding.api_key,
            &mut masked.generation.api_key,
        ] {
            if key.is_some() {
                *key = Some("********".to_string());
            }
        }
        masked.to_toml()
    }

    fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| RagError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }
}

fn parse_env<T: FromStr>(value: &str, key: &str, error: fn(String) -> RagError) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| error(format!("{} must be a non-negative integer, got '{}'", key, value)))
}
