//! reviewrag - retrieval-augmented answers over product reviews
//!
//! Ingests JSON Lines review exports into a vector index and answers
//! natural-language questions with citations to the reviews used.
//!
//! # Architecture
//!
//! - **Ingestion**: record parser, chunker, enricher, embedder client and
//!   index writer, run as a bounded concurrent pipeline
//! - **Query**: retriever, context assembler and answer orchestrator
//! - **Boundaries**: `VectorStore`, `Embedder` and `Generator` traits with
//!   Qdrant, Ollama and OpenAI-compatible implementations

// Core types and errors
pub mod errors;
pub mod types;

pub use errors::{RagError, Result};

// External capabilities
pub mod embedding;
pub mod http;
pub mod llm;
pub mod store;

// Pipelines
pub mod ingestion;
pub mod rag;

// Ambient stack
pub mod cli;
pub mod config;
pub mod logging;
pub mod retry;
pub mod telemetry;
