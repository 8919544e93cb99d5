//! Query side of the pipeline
//!
//! - `retrieval`: top-K search with metadata filters
//! - `context`: numbered, budgeted context blocks
//! - `answer`: prompt, model call and citation mapping
//! - `pipeline`: the chain end to end, with cancellation

pub mod answer;
pub mod context;
pub mod pipeline;
pub mod redact;
pub mod retrieval;

pub use answer::AnswerOrchestrator;
pub use context::{AssembledContext, ContextAssembler, ContextEntry};
pub use pipeline::{QueryOutcome, QueryPipeline, QueryRequest};
pub use retrieval::{Retriever, SearchParams};
