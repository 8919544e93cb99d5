//! Type definitions module
//!
//! Data carried between pipeline stages: review records, passages with
//! their metadata, and generated answers.

pub mod answer;
pub mod passage;
pub mod record;

// Re-export commonly used types
pub use answer::{Answer, Citation};
pub use passage::{Passage, PassageId, PassageMetadata, Sentiment};
pub use record::ReviewRecord;
