//! End-to-end query chain: embed, retrieve, assemble, generate

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::embedding::EmbedderClient;
use crate::errors::{RagError, Result};
use crate::rag::answer::{AnswerOrchestrator, NO_RELEVANT_REVIEWS};
use crate::rag::context::{AssembledContext, ContextAssembler};
use crate::rag::retrieval::{Retriever, SearchParams};
use crate::store::MetadataFilter;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::Answer;

/// One question against the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: usize,
    pub filter: Option<MetadataFilter>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = if filter.is_empty() { None } else { Some(filter) };
        self
    }
}

/// Query pipeline result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub answer: Answer,
    /// Context the answer was generated from
    pub context: AssembledContext,
    /// Results returned by the retriever before assembly
    pub retrieved: usize,
    pub duration_ms: u64,
}

/// Read-only query pipeline; share it behind an `Arc` across queries
pub struct QueryPipeline {
    embedder: Arc<EmbedderClient>,
    retriever: Retriever,
    assembler: ContextAssembler,
    orchestrator: AnswerOrchestrator,
    telemetry: Option<TelemetryCollector>,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<EmbedderClient>,
        retriever: Retriever,
        assembler: ContextAssembler,
        orchestrator: AnswerOrchestrator,
    ) -> Self {
        Self {
            embedder,
            retriever,
            assembler,
            orchestrator,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Answer a question from the indexed reviews
    pub async fn answer(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        let started = Instant::now();

        if request.query.trim().is_empty() {
            return Ok(QueryOutcome {
                answer: Answer {
                    text: NO_RELEVANT_REVIEWS.to_string(),
                    ..Answer::default()
                },
                context: AssembledContext::default(),
                retrieved: 0,
                duration_ms: 0,
            });
        }

        let vector = self.embedder.embed_query(&request.query).await?;

        let params = SearchParams {
            top_k: request.top_k,
            filter: request.filter.clone(),
        };
        let results = self.retriever.retrieve(&vector, &params).await?;

        let context = self.assembler.assemble(&results);
        let answer = self.orchestrator.answer(&request.query, &context).await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            retrieved = results.len(),
            context_entries = context.entries.len(),
            citations = answer.citations.len(),
            duration_ms,
            "query answered"
        );
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(TelemetryEvent::QueryCompleted {
                results: results.len(),
                duration_ms,
                timestamp: Instant::now(),
            });
        }

        Ok(QueryOutcome {
            answer,
            context,
            retrieved: results.len(),
            duration_ms,
        })
    }

    /// Like [`answer`](Self::answer), abandoned with `Cancelled` as soon as
    /// `cancel` completes. Nothing is written on either path.
    pub async fn answer_until<F>(&self, request: &QueryRequest, cancel: F) -> Result<QueryOutcome>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::debug!("query cancelled");
                Err(RagError::Cancelled)
            }
            outcome = self.answer(request) => outcome,
        }
    }
}
