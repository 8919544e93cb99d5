//! Passage chunker
//!
//! Splits normalized record text into passages of at most
//! `max_chunk_length` chars. Consecutive passages share exactly `overlap`
//! chars, so the text is recovered by taking the first passage and then the
//! part of every following passage after its first `overlap` chars.

use crate::errors::{RagError, Result};
use crate::types::{Passage, PassageId, ReviewRecord};

/// Validated chunking parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chunk_length: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker; fails when `max_chunk_length` is zero or
    /// `overlap >= max_chunk_length`
    pub fn new(max_chunk_length: usize, overlap: usize) -> Result<Self> {
        if max_chunk_length == 0 {
            return Err(RagError::ChunkConfig(
                "max_chunk_length must be greater than 0".to_string(),
            ));
        }
        if overlap >= max_chunk_length {
            return Err(RagError::ChunkConfig(format!(
                "overlap ({}) must be less than max_chunk_length ({})",
                overlap, max_chunk_length
            )));
        }
        Ok(Self {
            max_chunk_length,
            overlap,
        })
    }

    pub fn max_chunk_length(&self) -> usize {
        self.max_chunk_length
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Char windows `(offset, len)` covering `text`
    pub fn windows(&self, text: &str) -> Vec<(usize, usize)> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut windows = Vec::new();
        if total == 0 {
            return windows;
        }

        let mut start = 0;
        loop {
            let hard_end = (start + self.max_chunk_length).min(total);
            if hard_end == total {
                windows.push((start, total - start));
                break;
            }

            // Prefer to cut right after whitespace, but only past the overlap
            // so the next window still advances
            let floor = start + self.overlap;
            let end = (floor + 1..=hard_end)
                .rev()
                .find(|&p| chars[p - 1].is_whitespace())
                .unwrap_or(hard_end);

            windows.push((start, end - start));
            start = end - self.overlap;
        }

        windows
    }

    /// Split a record into passages with stable ids
    pub fn chunk(&self, record: &ReviewRecord) -> Vec<Passage> {
        let windows = self.windows(&record.text);
        if windows.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = record.text.chars().collect();
        windows
            .into_iter()
            .enumerate()
            .map(|(position, (offset, len))| Passage {
                id: PassageId::derive(&record.id, offset),
                record_id: record.id.clone(),
                text: chars[offset..offset + len].iter().collect(),
                position,
                offset,
                len,
            })
            .collect()
    }
}

/// Rebuild the source text from a record's passages
pub fn reassemble(passages: &[Passage], overlap: usize) -> String {
    let mut out = String::new();
    for (i, passage) in passages.iter().enumerate() {
        if i == 0 {
            out.push_str(&passage.text);
        } else {
            out.extend(passage.text.chars().skip(overlap));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn record(text: &str) -> ReviewRecord {
        ReviewRecord::new("r1", text)
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(matches!(Chunker::new(0, 0), Err(RagError::ChunkConfig(_))));
        assert!(matches!(Chunker::new(10, 10), Err(RagError::ChunkConfig(_))));
        assert!(matches!(Chunker::new(10, 11), Err(RagError::ChunkConfig(_))));
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        let chunker = Chunker::new(50, 0).unwrap();
        assert!(chunker.chunk(&record("")).is_empty());
    }

    #[test]
    fn test_short_text_single_passage() {
        let chunker = Chunker::new(50, 10).unwrap();
        let text = "Battery lasts two days, screen is dim.";
        let passages = chunker.chunk(&record(text));
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].text, text);
        assert_eq!(passages[0].offset, 0);
        assert_eq!(passages[0].position, 0);

        let exact = "x".repeat(50);
        assert_eq!(chunker.chunk(&record(&exact)).len(), 1);
    }

    #[test]
    fn test_cuts_after_whitespace() {
        let chunker = Chunker::new(12, 0).unwrap();
        let passages = chunker.chunk(&record("battery life is great overall"));
        assert_eq!(passages[0].text, "battery ");
        assert_eq!(reassemble(&passages, 0), "battery life is great overall");
        assert!(passages.iter().all(|p| p.len <= 12));
    }

    #[test]
    fn test_hard_cut_without_whitespace() {
        let chunker = Chunker::new(4, 1).unwrap();
        let passages = chunker.chunk(&record("abcdefghij"));
        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "defg", "ghij"]);
        assert_eq!(passages[2].offset, 6);
    }

    #[test]
    fn test_multibyte_text() {
        let chunker = Chunker::new(3, 0).unwrap();
        let passages = chunker.chunk(&record("héllo wörld"));
        assert!(passages.iter().all(|p| p.text.chars().count() <= 3));
        assert_eq!(reassemble(&passages, 0), "héllo wörld");
    }

    #[test]
    fn test_ids_are_stable_and_distinct() {
        let chunker = Chunker::new(10, 2).unwrap();
        let text = "one two three four five six seven";
        let first = chunker.chunk(&record(text));
        let second = chunker.chunk(&record(text));
        assert_eq!(first, second);

        let mut ids: Vec<_> = first.iter().map(|p| p.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), first.len());
    }

    #[quickcheck]
    fn prop_chunking_round_trips(text: String, max: u8, overlap: u8) -> bool {
        let max = (max as usize % 40) + 1;
        let overlap = overlap as usize % max;
        let chunker = match Chunker::new(max, overlap) {
            Ok(c) => c,
            Err(_) => return false,
        };

        let passages = chunker.chunk(&record(&text));
        let bounded = passages.iter().all(|p| p.len <= max && p.len == p.text.chars().count());
        let overlapping = passages.windows(2).all(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            a.offset + a.len - b.offset == overlap
        });
        let positioned = passages.iter().enumerate().all(|(i, p)| p.position == i);

        bounded
            && overlapping
            && positioned
            && reassemble(&passages, overlap) == text
            && (text.is_empty() == passages.is_empty())
    }
}
