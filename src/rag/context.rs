//! Context builder for answer prompts
//!
//! Turns ranked retrieval results into numbered `[n]` blocks that fit a
//! character budget, and keeps the tag table used to resolve citations.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::ContextConfig;
use crate::rag::redact::redact_pii;
use crate::store::{rank, RetrievalResult};
use crate::types::{Citation, PassageId};

/// Room reserved for the `[n] (review .., rated ../5)` header of a block
pub const ENTRY_HEADER_CHARS: usize = 64;

/// One numbered block of the context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// 1-based tag, rendered as `[tag]`
    pub tag: usize,
    pub passage_id: PassageId,
    pub record_id: String,
    pub rating: Option<f32>,
    /// Passage text after redaction
    pub text: String,
    pub score: f32,
}

impl ContextEntry {
    fn render(&self) -> String {
        let header = match self.rating {
            Some(rating) => format!("[{}] (review {}, rated {}/5)", self.tag, self.record_id, rating),
            None => format!("[{}] (review {})", self.tag, self.record_id),
        };
        format!("{}\n{}", header, self.text)
    }
}

/// Assembled context for prompt augmentation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// Rendered blocks, at most `max_context_chars` characters
    pub text: String,
    /// Tag table in rank order
    pub entries: Vec<ContextEntry>,
    pub dropped_duplicates: usize,
    pub dropped_over_cap: usize,
    pub dropped_for_size: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, tag: usize) -> Option<&ContextEntry> {
        tag.checked_sub(1).and_then(|idx| self.entries.get(idx))
    }

    /// Citation for a `[tag]` marker, if the tag is in the table
    pub fn citation_for(&self, tag: usize) -> Option<Citation> {
        self.entry(tag).map(|entry| Citation {
            tag,
            passage_id: entry.passage_id,
            record_id: entry.record_id.clone(),
            excerpt: entry.text.clone(),
        })
    }

    /// Drop the lowest-ranked blocks until the text is at most `max_chars`
    pub fn shrink_to(&mut self, max_chars: usize) {
        while !self.entries.is_empty() && self.text.chars().count() > max_chars {
            self.entries.pop();
            self.dropped_for_size += 1;
            self.text = render(&self.entries);
        }
    }
}

/// Context assembler
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_context_chars: usize,
    per_record_cap: usize,
    redact_pii: bool,
}

impl ContextAssembler {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            max_context_chars: config.max_context_chars,
            per_record_cap: config.per_record_cap,
            redact_pii: config.redact_pii,
        }
    }

    /// Build the context from retrieval results.
    ///
    /// Results are walked in rank order. Repeated passage ids and passages
    /// past the per-record cap are skipped, then the lowest-ranked entries
    /// are removed until the rendered text fits the budget.
    pub fn assemble(&self, results: &[RetrievalResult]) -> AssembledContext {
        let mut ranked: Vec<&RetrievalResult> = results.iter().collect();
        ranked.sort_by(|a, b| rank(a, b));

        let mut context = AssembledContext::default();
        let mut seen = HashSet::new();
        let mut per_record: HashMap<&str, usize> = HashMap::new();

        for result in ranked {
            if !seen.insert(result.passage_id) {
                context.dropped_duplicates += 1;
                continue;
            }

            let taken = per_record.entry(result.metadata.record_id.as_str()).or_insert(0);
            if *taken >= self.per_record_cap {
                context.dropped_over_cap += 1;
                continue;
            }
            *taken += 1;

            let text = if self.redact_pii {
                redact_pii(&result.text)
            } else {
                result.text.clone()
            };

            context.entries.push(ContextEntry {
                tag: context.entries.len() + 1,
                passage_id: result.passage_id,
                record_id: result.metadata.record_id.clone(),
                rating: result.metadata.rating,
                text,
                score: result.score,
            });
        }

        context.text = render(&context.entries);
        context.shrink_to(self.max_context_chars);

        if context.dropped_duplicates + context.dropped_over_cap + context.dropped_for_size > 0 {
            tracing::debug!(
                kept = context.entries.len(),
                duplicates = context.dropped_duplicates,
                over_cap = context.dropped_over_cap,
                for_size = context.dropped_for_size,
                "context trimmed"
            );
        }

        context
    }
}

fn render(entries: &[ContextEntry]) -> String {
    entries
        .iter()
        .map(ContextEntry::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PassageMetadata;

    fn result(record: &str, offset: usize, text: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            passage_id: PassageId::derive(record, offset),
            text: text.to_string(),
            metadata: PassageMetadata {
                record_id: record.to_string(),
                product_id: None,
                rating: Some(4.0),
                timestamp: None,
                reviewer_id: None,
                position: 0,
                offset,
                aspect: None,
                sentiment: None,
                sentiment_score: None,
            },
            score,
        }
    }

    fn assembler(max_context_chars: usize, per_record_cap: usize) -> ContextAssembler {
        ContextAssembler::new(&ContextConfig {
            max_context_chars,
            per_record_cap,
            redact_pii: true,
        })
    }

    #[test]
    fn test_numbered_blocks_in_rank_order() {
        let results = vec![
            result("r2", 0, "Screen is dim.", 0.4),
            result("r1", 0, "Battery lasts two days.", 0.9),
        ];
        let context = assembler(1000, 2).assemble(&results);

        assert_eq!(context.entries.len(), 2);
        assert_eq!(context.entries[0].record_id, "r1");
        assert!(context.text.starts_with("[1] (review r1, rated 4/5)\nBattery lasts two days."));
        assert!(context.text.contains("[2] (review r2"));
    }

    #[test]
    fn test_duplicates_and_record_cap() {
        let results = vec![
            result("r1", 0, "a", 0.9),
            result("r1", 0, "a", 0.9),
            result("r1", 10, "b", 0.8),
            result("r1", 20, "c", 0.7),
            result("r2", 0, "d", 0.1),
        ];
        let context = assembler(1000, 2).assemble(&results);

        assert_eq!(context.dropped_duplicates, 1);
        assert_eq!(context.dropped_over_cap, 1);
        let records: Vec<&str> = context.entries.iter().map(|e| e.record_id.as_str()).collect();
        assert_eq!(records, vec!["r1", "r1", "r2"]);
    }

    #[test]
    fn test_budget_drops_lowest_ranked() {
        let results = vec![
            result("r1", 0, "first passage", 0.9),
            result("r2", 0, "second passage", 0.5),
        ];
        let one_block = render(&assembler(1000, 2).assemble(&results[..1]).entries);
        let context = assembler(one_block.chars().count(), 2).assemble(&results);

        assert_eq!(context.entries.len(), 1);
        assert_eq!(context.entries[0].record_id, "r1");
        assert_eq!(context.dropped_for_size, 1);
        assert!(context.text.chars().count() <= one_block.chars().count());
    }

    #[test]
    fn test_tiny_budget_yields_empty_context() {
        let context = assembler(5, 2).assemble(&[result("r1", 0, "long enough text", 0.9)]);
        assert!(context.is_empty());
        assert!(context.text.is_empty());
    }

    #[test]
    fn test_pii_is_redacted() {
        let context = assembler(1000, 2).assemble(&[result("r1", 0, "mail me: a.b@example.org", 0.9)]);
        assert!(context.text.contains("[REDACTED]"));
        assert!(!context.text.contains("example.org"));
    }

    #[test]
    fn test_citation_lookup() {
        let context = assembler(1000, 2).assemble(&[result("r1", 0, "text", 0.9)]);
        let citation = context.citation_for(1).unwrap();
        assert_eq!(citation.record_id, "r1");
        assert_eq!(citation.passage_id, PassageId::derive("r1", 0));
        assert!(context.citation_for(0).is_none());
        assert!(context.citation_for(2).is_none());
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let results = vec![
            result("r1", 0, "x", 0.5),
            result("r2", 0, "y", 0.5),
            result("r3", 0, "z", 0.7),
        ];
        let mut reversed = results.clone();
        reversed.reverse();
        let a = assembler(1000, 2).assemble(&results);
        let b = assembler(1000, 2).assemble(&reversed);
        assert_eq!(a, b);
    }
}
