//! Vector store boundary
//!
//! The store is the only durable owner of indexed entries. Everything else
//! in the crate talks to it through [`VectorStore`]:
//! - `QdrantStore`: remote Qdrant collection
//! - `InMemoryStore`: process-local brute-force index

pub mod memory;
pub mod qdrant;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{RagError, Result};
use crate::types::{PassageId, PassageMetadata, Sentiment};

pub use memory::InMemoryStore;
pub use qdrant::QdrantStore;

/// Similarity metric, fixed when an index is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Dot,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Dot => "dot",
        }
    }

    /// Similarity of two equal-length vectors; higher is closer
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        match self {
            Metric::Dot => dot,
            Metric::Cosine => {
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
        }
    }
}

/// One stored passage with its vector
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEntry {
    pub id: PassageId,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: PassageMetadata,
}

/// A scored search hit; the vector is not returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub passage_id: PassageId,
    pub text: String,
    pub metadata: PassageMetadata,
    pub score: f32,
}

/// Best score first, ties by ascending passage id. NaN scores rank last.
pub fn rank(a: &RetrievalResult, b: &RetrievalResult) -> Ordering {
    let key = |score: f32| if score.is_nan() { f32::NEG_INFINITY } else { score };
    key(b.score)
        .total_cmp(&key(a.score))
        .then_with(|| a.passage_id.cmp(&b.passage_id))
}

/// Conjunction of optional metadata constraints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub product_id: Option<String>,
    pub min_rating: Option<f32>,
    pub max_rating: Option<f32>,
    /// Inclusive lower bound, epoch milliseconds
    pub since: Option<i64>,
    /// Inclusive upper bound, epoch milliseconds
    pub until: Option<i64>,
    pub sentiment: Option<Sentiment>,
    pub aspect: Option<String>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self == &MetadataFilter::default()
    }

    /// Whether an entry satisfies every constraint. A constrained field
    /// that is missing from the metadata fails the check.
    pub fn matches(&self, metadata: &PassageMetadata) -> bool {
        if let Some(product) = &self.product_id {
            if metadata.product_id.as_ref() != Some(product) {
                return false;
            }
        }

        if self.min_rating.is_some() || self.max_rating.is_some() {
            let Some(rating) = metadata.rating else {
                return false;
            };
            if self.min_rating.is_some_and(|min| rating < min)
                || self.max_rating.is_some_and(|max| rating > max)
            {
                return false;
            }
        }

        if self.since.is_some() || self.until.is_some() {
            let Some(ts) = metadata.timestamp else {
                return false;
            };
            if self.since.is_some_and(|since| ts < since)
                || self.until.is_some_and(|until| ts > until)
            {
                return false;
            }
        }

        if let Some(sentiment) = self.sentiment {
            if metadata.sentiment != Some(sentiment) {
                return false;
            }
        }

        if let Some(aspect) = &self.aspect {
            if metadata.aspect.as_ref() != Some(aspect) {
                return false;
            }
        }

        true
    }
}

/// Check a vector against the index dimension
pub fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(RagError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Abstract interface for vector storage backends.
///
/// Implementations report raw failures; bounded retry happens in the
/// writer and the retriever.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Metric the index was created with
    fn metric(&self) -> Metric;

    /// Vector length, once known
    async fn dimension(&self) -> Option<usize>;

    /// Insert or overwrite entries keyed by passage id
    async fn upsert(&self, entries: &[IndexedEntry]) -> Result<()>;

    /// Up to `limit` nearest entries satisfying `filter`, best first
    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>>;

    /// Remove entries by key; unknown ids are ignored
    async fn delete(&self, ids: &[PassageId]) -> Result<()>;

    /// Number of stored entries
    async fn count(&self) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> PassageMetadata {
        PassageMetadata {
            record_id: "r1".to_string(),
            product_id: Some("p1".to_string()),
            rating: Some(4.0),
            timestamp: Some(1_000),
            reviewer_id: None,
            position: 0,
            offset: 0,
            aspect: Some("battery".to_string()),
            sentiment: Some(Sentiment::Positive),
            sentiment_score: Some(0.8),
        }
    }

    fn hit(record: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            passage_id: PassageId::derive(record, 0),
            text: String::new(),
            metadata: metadata(),
            score,
        }
    }

    #[test]
    fn test_rank_is_total_with_nan_scores() {
        let mut hits = vec![
            hit("a", f32::NAN),
            hit("b", 0.5),
            hit("c", f32::INFINITY),
            hit("d", -f32::NAN),
            hit("e", 0.5),
        ];
        hits.sort_by(rank);

        let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
        assert_eq!(scores[0], f32::INFINITY);
        assert_eq!(&scores[1..3], &[0.5, 0.5]);
        assert!(scores[3].is_nan() && scores[4].is_nan());
        assert!(hits[1].passage_id < hits[2].passage_id);
        assert!(hits[3].passage_id < hits[4].passage_id);
    }

    #[test]
    fn test_cosine_and_dot() {
        let a = [1.0, 0.0];
        let b = [2.0, 0.0];
        let c = [0.0, 3.0];
        assert!((Metric::Cosine.score(&a, &b) - 1.0).abs() < 1e-6);
        assert_eq!(Metric::Cosine.score(&a, &c), 0.0);
        assert_eq!(Metric::Dot.score(&a, &b), 2.0);
        assert_eq!(Metric::Cosine.score(&a, &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = MetadataFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&metadata()));
    }

    #[test]
    fn test_filter_constraints() {
        let meta = metadata();

        let by_product = MetadataFilter {
            product_id: Some("p2".to_string()),
            ..Default::default()
        };
        assert!(!by_product.matches(&meta));

        let by_rating = MetadataFilter {
            min_rating: Some(4.0),
            max_rating: Some(5.0),
            ..Default::default()
        };
        assert!(by_rating.matches(&meta));

        let by_time = MetadataFilter {
            since: Some(2_000),
            ..Default::default()
        };
        assert!(!by_time.matches(&meta));

        let by_aspect = MetadataFilter {
            aspect: Some("battery".to_string()),
            sentiment: Some(Sentiment::Positive),
            ..Default::default()
        };
        assert!(by_aspect.matches(&meta));
    }

    #[test]
    fn test_missing_field_fails_constraint() {
        let mut meta = metadata();
        meta.rating = None;
        let filter = MetadataFilter {
            min_rating: Some(1.0),
            ..Default::default()
        };
        assert!(!filter.matches(&meta));
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(3, &[0.0; 3]).is_ok());
        assert!(matches!(
            check_dimension(3, &[0.0; 2]),
            Err(RagError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }
}
