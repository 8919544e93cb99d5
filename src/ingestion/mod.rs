//! Ingestion path: records in, indexed passages out
//!
//! Components:
//! - `record`: line-delimited record parser with per-line validation
//! - `normalizer`: canonical text and embedding-only clean-up
//! - `chunker`: bounded, overlapping passages with stable ids
//! - `enricher`: aspect and sentiment metadata
//! - `writer`: batched upserts with per-item failure reporting
//! - `pipeline`: wires the above onto a bounded worker pool

pub mod chunker;
pub mod enricher;
pub mod normalizer;
pub mod pipeline;
pub mod record;
pub mod writer;

pub use chunker::Chunker;
pub use pipeline::{IngestProgress, IngestReport, IngestionPipeline, RecordRejection};
pub use record::{ParseStats, RecordParser};
pub use writer::{IndexWriter, WriteReport};
