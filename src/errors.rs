//! Error types for reviewrag
//!
//! One enum covers the whole pipeline. Transport-level variants (`HttpError`,
//! `Upstream`, `Timeout`, ...) are produced by the raw clients and classified
//! by the retry layer, which surfaces them to callers as one of the
//! dependency-level `*Unavailable` variants.

use thiserror::Error;

/// External capability a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    Embedding,
    Index,
    Generation,
}

impl Dependency {
    /// Build the dependency-level error reported after retries give up
    pub fn unavailable(self, attempts: u32, reason: impl Into<String>) -> RagError {
        let reason = reason.into();
        match self {
            Dependency::Embedding => RagError::EmbeddingUnavailable { attempts, reason },
            Dependency::Index => RagError::IndexUnavailable { attempts, reason },
            Dependency::Generation => RagError::GenerationUnavailable { attempts, reason },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Embedding => "embedding",
            Dependency::Index => "index",
            Dependency::Generation => "generation",
        }
    }
}

/// Main error type for ingestion and query operations
#[derive(Error, Debug)]
pub enum RagError {
    /// A single input line could not be turned into a review record
    #[error("Invalid record at line {line}: field '{field}' {reason}")]
    RecordValidation {
        line: usize,
        field: String,
        reason: String,
    },

    /// Chunking parameters are unusable
    #[error("Invalid chunking configuration: {0}")]
    ChunkConfig(String),

    /// Embedding capability failed after bounded retries
    #[error("Embedding service unavailable after {attempts} attempt(s): {reason}")]
    EmbeddingUnavailable { attempts: u32, reason: String },

    /// Vector store failed after bounded retries
    #[error("Vector index unavailable after {attempts} attempt(s): {reason}")]
    IndexUnavailable { attempts: u32, reason: String },

    /// Generation capability failed after bounded retries
    #[error("Generation service unavailable after {attempts} attempt(s): {reason}")]
    GenerationUnavailable { attempts: u32, reason: String },

    /// Vector length does not match the index
    #[error("Embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Existing index was built with another similarity metric
    #[error("Similarity metric mismatch: index uses {actual}, configured {expected}")]
    MetricMismatch { expected: String, actual: String },

    /// Non-success HTTP status from an external service
    #[error("{service} returned HTTP {status}: {body}")]
    Upstream {
        service: String,
        status: u16,
        body: String,
    },

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Per-call timeout elapsed
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Query was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic errors with context
    #[error("{0}")]
    Generic(String),
}

impl RagError {
    /// Whether a failed external call is worth repeating
    pub fn is_transient(&self) -> bool {
        match self {
            RagError::Timeout { .. } => true,
            RagError::HttpError(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            RagError::Upstream { status, .. } => *status == 429 || *status >= 500,
            // Store client errors carry no status we can inspect
            RagError::Generic(_) => true,
            _ => false,
        }
    }

    /// Whether the error describes a failing external call rather than
    /// a problem with the caller's data or configuration
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            RagError::Timeout { .. }
                | RagError::HttpError(_)
                | RagError::Upstream { .. }
                | RagError::SerializationError(_)
                | RagError::Generic(_)
        )
    }

    /// True for the three `*Unavailable` variants
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingUnavailable { .. }
                | RagError::IndexUnavailable { .. }
                | RagError::GenerationUnavailable { .. }
        )
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, RagError>;

/// Convert anyhow errors to RagError
impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::Generic(err.to_string())
    }
}

impl From<qdrant_client::QdrantError> for RagError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        RagError::Generic(format!("qdrant: {}", err))
    }
}
