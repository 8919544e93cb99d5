//! Ingestion pipeline
//!
//! Records are parsed and chunked sequentially. Passages are grouped into
//! jobs of one embedding batch each, and jobs are embedded and written on a
//! bounded pool of concurrent futures. Completion order does not matter
//! since upserts are keyed by passage id.

use std::collections::HashSet;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, StreamExt};

use super::chunker::Chunker;
use super::enricher::enrich;
use super::record::RecordParser;
use super::writer::{IndexWriter, WriteReport};
use crate::embedding::EmbedderClient;
use crate::errors::{RagError, Result};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};
use crate::types::{Passage, PassageId, PassageMetadata};

/// A record the parser turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRejection {
    pub line: usize,
    pub field: String,
    pub reason: String,
}

/// Totals for one ingestion run
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub records_read: usize,
    pub records_skipped: usize,
    pub records_chunked: usize,
    pub records_indexed: usize,
    pub passages_created: usize,
    pub passages_embedded: usize,
    pub passages_indexed: usize,
    pub passages_failed: usize,
    pub rejections: Vec<RecordRejection>,
    pub failures: Vec<(PassageId, String)>,
}

impl IngestReport {
    /// True when every created passage was indexed
    pub fn is_complete(&self) -> bool {
        self.passages_failed == 0
    }
}

/// Snapshot handed to the progress callback after each job
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestProgress {
    pub batches_done: usize,
    pub passages_indexed: usize,
    pub passages_failed: usize,
}

type ProgressFn = Box<dyn Fn(IngestProgress) + Send + Sync>;

/// One embedding batch worth of passages
struct Job {
    passages: Vec<(Passage, PassageMetadata)>,
}

struct JobOutcome {
    embedded: usize,
    report: WriteReport,
    failed_records: HashSet<String>,
}

/// Pulls records from the parser and packs their passages into jobs
struct JobSource<'a, R> {
    parser: &'a mut RecordParser<R>,
    chunker: Chunker,
    job_size: usize,
    pending: Vec<(Passage, PassageMetadata)>,
    rejections: Vec<RecordRejection>,
    records_chunked: usize,
    passages_created: usize,
    fatal: Option<RagError>,
    telemetry: Option<TelemetryCollector>,
}

impl<'a, R: BufRead> JobSource<'a, R> {
    fn take_job(&mut self) -> Job {
        let split = self.pending.len().min(self.job_size);
        let rest = self.pending.split_off(split);
        Job {
            passages: std::mem::replace(&mut self.pending, rest),
        }
    }
}

impl<'a, R: BufRead> Iterator for JobSource<'a, R> {
    type Item = Job;

    fn next(&mut self) -> Option<Job> {
        while self.pending.len() < self.job_size && self.fatal.is_none() {
            match self.parser.next() {
                None => break,
                Some(Ok(record)) => {
                    let passages = self.chunker.chunk(&record);
                    self.records_chunked += 1;
                    self.passages_created += passages.len();
                    for passage in passages {
                        let metadata = enrich(&record, &passage);
                        self.pending.push((passage, metadata));
                    }
                }
                Some(Err(RagError::RecordValidation {
                    line,
                    field,
                    reason,
                })) => {
                    if let Some(telemetry) = &self.telemetry {
                        telemetry.record(TelemetryEvent::RecordRejected {
                            line,
                            field: field.clone(),
                            timestamp: Instant::now(),
                        });
                    }
                    self.rejections.push(RecordRejection {
                        line,
                        field,
                        reason,
                    });
                }
                Some(Err(e)) => self.fatal = Some(e),
            }
        }

        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_job())
        }
    }
}

/// Parse, chunk, enrich, embed and index a stream of review records
pub struct IngestionPipeline {
    chunker: Chunker,
    embedder: Arc<EmbedderClient>,
    writer: Arc<IndexWriter>,
    workers: usize,
    telemetry: Option<TelemetryCollector>,
    progress: Option<ProgressFn>,
}

impl IngestionPipeline {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<EmbedderClient>,
        writer: Arc<IndexWriter>,
        workers: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            writer,
            workers: workers.max(1),
            telemetry: None,
            progress: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Called after every finished job
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(IngestProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Ingest line-delimited records from `reader`.
    ///
    /// Rejected records and passages that could not be embedded or written
    /// are counted in the report. Only a dimension mismatch or an unreadable
    /// input aborts the run.
    pub async fn ingest<R: BufRead>(&self, reader: R, limit: Option<usize>) -> Result<IngestReport> {
        let started = Instant::now();
        let mut parser = RecordParser::new(reader).with_limit(limit);
        let mut source = JobSource {
            parser: &mut parser,
            chunker: self.chunker,
            job_size: self.embedder.batch_size(),
            pending: Vec::new(),
            rejections: Vec::new(),
            records_chunked: 0,
            passages_created: 0,
            fatal: None,
            telemetry: self.telemetry.clone(),
        };

        let mut report = IngestReport::default();
        let mut failed_records = HashSet::new();
        let mut batches_done = 0;

        {
            let mut outcomes = stream::iter(&mut source)
                .map(|job| self.process(job))
                .buffer_unordered(self.workers);

            while let Some(outcome) = outcomes.next().await {
                let outcome = outcome?;
                report.passages_embedded += outcome.embedded;
                report.passages_indexed += outcome.report.written.len();
                report.passages_failed += outcome.report.failed.len();
                report.failures.extend(outcome.report.failed);
                failed_records.extend(outcome.failed_records);
                batches_done += 1;

                if let Some(progress) = &self.progress {
                    progress(IngestProgress {
                        batches_done,
                        passages_indexed: report.passages_indexed,
                        passages_failed: report.passages_failed,
                    });
                }
            }
        }

        if let Some(e) = source.fatal.take() {
            return Err(e);
        }

        report.records_chunked = source.records_chunked;
        report.passages_created = source.passages_created;
        report.rejections = std::mem::take(&mut source.rejections);
        report.records_indexed = report.records_chunked.saturating_sub(failed_records.len());

        let stats = parser.stats();
        report.records_read = stats.read;
        report.records_skipped = stats.skipped;

        tracing::info!(
            records_read = report.records_read,
            records_skipped = report.records_skipped,
            passages_indexed = report.passages_indexed,
            passages_failed = report.passages_failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingestion finished"
        );
        Ok(report)
    }

    async fn process(&self, job: Job) -> Result<JobOutcome> {
        let texts: Vec<String> = job.passages.iter().map(|(p, _)| p.text.clone()).collect();

        let vectors = match self.embedder.embed_documents(&texts).await {
            Ok(vectors) => vectors,
            Err(e @ RagError::DimensionMismatch { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!(passages = texts.len(), error = %e, "embedding failed for batch");
                let reason = e.to_string();
                let failed_records = job.passages.iter().map(|(p, _)| p.record_id.clone()).collect();
                return Ok(JobOutcome {
                    embedded: 0,
                    report: WriteReport::all_failed(job.passages.iter().map(|(p, _)| p.id), &reason),
                    failed_records,
                });
            }
        };

        let embedded = vectors.len();
        let owners: Vec<(PassageId, String)> = job
            .passages
            .iter()
            .map(|(p, _)| (p.id, p.record_id.clone()))
            .collect();
        let items = job
            .passages
            .into_iter()
            .zip(vectors)
            .map(|((passage, metadata), vector)| (passage, vector, metadata))
            .collect();

        let report = self.writer.write(items).await?;
        let failed: HashSet<PassageId> = report.failed.iter().map(|(id, _)| *id).collect();
        let failed_records = owners
            .into_iter()
            .filter(|(id, _)| failed.contains(id))
            .map(|(_, record)| record)
            .collect();

        Ok(JobOutcome {
            embedded,
            report,
            failed_records,
        })
    }
}
