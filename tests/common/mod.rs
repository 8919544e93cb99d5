//! Shared fakes for integration tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use reviewrag::config::{ContextConfig, GenerationConfig};
use reviewrag::embedding::{Embedder, EmbedderClient};
use reviewrag::errors::{RagError, Result};
use reviewrag::ingestion::{Chunker, IndexWriter, IngestReport, IngestionPipeline};
use reviewrag::llm::{GenerationRequest, Generator};
use reviewrag::rag::{AnswerOrchestrator, ContextAssembler, QueryPipeline, Retriever};
use reviewrag::retry::RetryManager;
use reviewrag::store::{
    IndexedEntry, InMemoryStore, MetadataFilter, Metric, RetrievalResult, VectorStore,
};
use reviewrag::types::PassageId;

pub const DIMENSION: usize = 64;

/// The three-record sample: two valid reviews and one with empty text
pub const SAMPLE_REVIEWS: &str = r#"{"id":1,"text":"Great battery life."}
{"id":2,"text":"Screen cracked on arrival."}
{"id":3,"text":""}
"#;

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

/// Bag-of-words hashing embedder; deterministic and offline
pub struct HashingEmbedder {
    calls: AtomicUsize,
    /// Texts containing this marker fail with a transient upstream error
    fail_marker: Option<String>,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_marker: None,
        }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_marker: Some(marker.to_lowercase()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSION];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[(fnv1a(token) % DIMENSION as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.fail_marker {
            if texts.iter().any(|t| t.to_lowercase().contains(marker)) {
                return Err(RagError::Upstream {
                    service: "hashing".to_string(),
                    status: 503,
                    body: "overloaded".to_string(),
                });
            }
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Generator replaying canned replies and recording every request
pub struct ScriptedGenerator {
    replies: Mutex<Vec<Result<String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    /// Always answers `reply`
    pub fn replying(reply: &str) -> Self {
        Self {
            replies: Mutex::new(vec![Ok(reply.to_string())]),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Replies in order; the last one repeats
    pub fn sequence(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

fn clone_reply(reply: &Result<String>) -> Result<String> {
    match reply {
        Ok(text) => Ok(text.clone()),
        Err(RagError::Upstream {
            service,
            status,
            body,
        }) => Err(RagError::Upstream {
            service: service.clone(),
            status: *status,
            body: body.clone(),
        }),
        Err(other) => Err(RagError::Generic(other.to_string())),
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            clone_reply(&replies.remove(0))
        } else {
            replies
                .first()
                .map(clone_reply)
                .unwrap_or_else(|| Ok(String::new()))
        }
    }
}

fn upstream_down() -> RagError {
    RagError::Upstream {
        service: "flaky-store".to_string(),
        status: 503,
        body: "unavailable".to_string(),
    }
}

/// In-memory store with injectable failures
pub struct FlakyStore {
    inner: InMemoryStore,
    /// Upserts touching these records always fail
    poisoned: HashSet<String>,
    /// Remaining query calls that fail before queries succeed
    query_failures: AtomicUsize,
    down: AtomicBool,
    upserts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(Metric::Cosine),
            poisoned: HashSet::new(),
            query_failures: AtomicUsize::new(0),
            down: AtomicBool::new(false),
            upserts: AtomicUsize::new(0),
        }
    }

    pub fn poison(mut self, record_id: &str) -> Self {
        self.poisoned.insert(record_id.to_string());
        self
    }

    pub fn failing_queries(self, count: usize) -> Self {
        self.query_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub async fn ids(&self) -> Vec<PassageId> {
        self.inner.ids().await
    }

    pub async fn entry(&self, id: &PassageId) -> Option<IndexedEntry> {
        self.inner.get(id).await
    }

    fn check_up(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(upstream_down())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    fn metric(&self) -> Metric {
        self.inner.metric()
    }

    async fn dimension(&self) -> Option<usize> {
        self.inner.dimension().await
    }

    async fn upsert(&self, entries: &[IndexedEntry]) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;
        if entries
            .iter()
            .any(|e| self.poisoned.contains(&e.metadata.record_id))
        {
            return Err(upstream_down());
        }
        self.inner.upsert(entries).await
    }

    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        self.check_up()?;
        let remaining = self.query_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.query_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(upstream_down());
        }
        self.inner.query(vector, limit, filter).await
    }

    async fn delete(&self, ids: &[PassageId]) -> Result<()> {
        self.check_up()?;
        self.inner.delete(ids).await
    }

    async fn count(&self) -> Result<usize> {
        self.check_up()?;
        self.inner.count().await
    }
}

/// Fast retries for tests
pub fn retry() -> RetryManager {
    RetryManager::with_config(2, 1)
}

pub fn ingestion_pipeline(
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    max_chunk_length: usize,
    batch_size: usize,
) -> IngestionPipeline {
    let chunker = Chunker::new(max_chunk_length, 0).unwrap();
    let client = Arc::new(EmbedderClient::new(embedder, batch_size, None, retry()));
    let writer = Arc::new(IndexWriter::new(store, 16, retry()));
    IngestionPipeline::new(chunker, client, writer, 2)
}

pub async fn ingest(pipeline: &IngestionPipeline, input: &str) -> IngestReport {
    pipeline
        .ingest(Cursor::new(input.to_string()), None)
        .await
        .unwrap()
}

pub fn query_pipeline(
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
) -> QueryPipeline {
    let client = Arc::new(EmbedderClient::new(embedder, 8, None, retry()));
    let retriever = Retriever::new(store, retry());
    let assembler = ContextAssembler::new(&ContextConfig::default());
    let orchestrator = AnswerOrchestrator::new(generator, &GenerationConfig::default(), retry());
    QueryPipeline::new(client, retriever, assembler, orchestrator)
}
