//! Index writer
//!
//! Upserts passage entries in batches. A batch the store keeps rejecting is
//! replayed one entry at a time so the writable entries still land and each
//! failure is reported against its own passage id.

use std::sync::Arc;
use std::time::Instant;

use crate::errors::{Dependency, RagError, Result};
use crate::retry::RetryManager;
use crate::store::{check_dimension, IndexedEntry, VectorStore};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{Passage, PassageId, PassageMetadata};

/// Per-item outcome of a write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteReport {
    pub written: Vec<PassageId>,
    pub failed: Vec<(PassageId, String)>,
}

impl WriteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: WriteReport) {
        self.written.extend(other.written);
        self.failed.extend(other.failed);
    }

    /// Mark every id as failed with the same reason
    pub fn all_failed(ids: impl IntoIterator<Item = PassageId>, reason: &str) -> Self {
        Self {
            written: Vec::new(),
            failed: ids.into_iter().map(|id| (id, reason.to_string())).collect(),
        }
    }
}

/// Batched, retried writes into a vector store
pub struct IndexWriter {
    store: Arc<dyn VectorStore>,
    batch_size: usize,
    retry: RetryManager,
    telemetry: Option<TelemetryCollector>,
}

impl IndexWriter {
    pub fn new(store: Arc<dyn VectorStore>, batch_size: usize, retry: RetryManager) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            retry,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Write `(passage, vector, metadata)` triples.
    ///
    /// A vector whose length disagrees with the index (or with the rest of
    /// the input when the index is still empty) aborts with
    /// `DimensionMismatch` before anything is sent.
    pub async fn write(
        &self,
        items: Vec<(Passage, Vec<f32>, PassageMetadata)>,
    ) -> Result<WriteReport> {
        let mut report = WriteReport::default();
        let Some(first) = items.first() else {
            return Ok(report);
        };

        let expected = self
            .store
            .dimension()
            .await
            .unwrap_or_else(|| first.1.len());
        for (_, vector, _) in &items {
            check_dimension(expected, vector)?;
        }

        let entries: Vec<IndexedEntry> = items
            .into_iter()
            .map(|(passage, vector, metadata)| IndexedEntry {
                id: passage.id,
                vector,
                text: passage.text,
                metadata,
            })
            .collect();

        for batch in entries.chunks(self.batch_size) {
            let started = Instant::now();
            let outcome = self.write_batch(batch).await?;

            if let Some(telemetry) = &self.telemetry {
                telemetry.record(TelemetryEvent::BatchIndexed {
                    written: outcome.written.len(),
                    failed: outcome.failed.len(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    timestamp: Instant::now(),
                });
            }
            report.merge(outcome);
        }

        Ok(report)
    }

    async fn write_batch(&self, batch: &[IndexedEntry]) -> Result<WriteReport> {
        let result = self
            .retry
            .execute_with_retry(Dependency::Index, || self.store.upsert(batch))
            .await;

        match result {
            Ok(()) => Ok(WriteReport {
                written: batch.iter().map(|e| e.id).collect(),
                failed: Vec::new(),
            }),
            Err(e @ RagError::DimensionMismatch { .. }) => Err(e),
            Err(e) => {
                tracing::warn!(
                    entries = batch.len(),
                    error = %e,
                    "batch upsert failed, replaying entries individually"
                );
                self.replay(batch).await
            }
        }
    }

    /// One attempt per entry; the batch already used up its retries
    async fn replay(&self, batch: &[IndexedEntry]) -> Result<WriteReport> {
        let single = self.retry.clone().with_max_attempts(1);
        let mut report = WriteReport::default();

        for entry in batch {
            let result = single
                .execute_with_retry(Dependency::Index, || {
                    self.store.upsert(std::slice::from_ref(entry))
                })
                .await;

            match result {
                Ok(()) => report.written.push(entry.id),
                Err(e @ RagError::DimensionMismatch { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(passage = %entry.id, error = %e, "entry not indexed");
                    report.failed.push((entry.id, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
