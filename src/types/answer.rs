use serde::{Deserialize, Serialize};

use super::PassageId;

/// One source referenced by an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// The `n` of the `[n]` marker
    pub tag: usize,
    pub passage_id: PassageId,
    pub record_id: String,
    /// Passage text as it appeared in the prompt
    pub excerpt: String,
}

/// Generated answer with the sources it cites
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Ordered by first appearance in `text`
    pub citations: Vec<Citation>,
    /// Markers the model produced that did not refer to the prompt's context
    pub rejected_tags: Vec<String>,
}

impl Answer {
    pub fn has_citations(&self) -> bool {
        !self.citations.is_empty()
    }
}
