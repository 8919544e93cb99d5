//! Retriever: top-K nearest passages for a query vector

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{Dependency, Result};
use crate::retry::RetryManager;
use crate::store::{rank, MetadataFilter, RetrievalResult, VectorStore};

/// Per-query search parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Maximum number of results
    pub top_k: usize,
    pub filter: Option<MetadataFilter>,
}

impl SearchParams {
    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = if filter.is_empty() { None } else { Some(filter) };
        self
    }
}

/// Nearest-neighbour search over the vector store
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    retry: RetryManager,
    candidate_multiplier: usize,
    min_score: Option<f32>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, retry: RetryManager) -> Self {
        Self {
            store,
            retry,
            candidate_multiplier: 2,
            min_score: None,
        }
    }

    /// Fetch `top_k * multiplier` candidates before the final cut
    pub fn with_candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.candidate_multiplier = multiplier.max(1);
        self
    }

    /// Drop results scoring below `min_score`
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    /// Up to `params.top_k` results, best score first, ties by ascending
    /// passage id. Every result satisfies the filter.
    pub async fn retrieve(&self, vector: &[f32], params: &SearchParams) -> Result<Vec<RetrievalResult>> {
        if params.top_k == 0 {
            return Ok(Vec::new());
        }

        let filter = params.filter.as_ref().filter(|f| !f.is_empty());
        let fetch = params.top_k.saturating_mul(self.candidate_multiplier);

        let candidates = self
            .retry
            .execute_with_retry(Dependency::Index, || self.store.query(vector, fetch, filter))
            .await?;
        let fetched = candidates.len();

        let mut seen = HashSet::new();
        let mut results: Vec<RetrievalResult> = candidates
            .into_iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .filter(|r| self.min_score.map_or(true, |min| r.score >= min))
            .filter(|r| seen.insert(r.passage_id))
            .collect();

        results.sort_by(rank);
        results.truncate(params.top_k);

        tracing::debug!(
            requested = params.top_k,
            fetched,
            returned = results.len(),
            "retrieval finished"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RagError;
    use crate::store::{IndexedEntry, InMemoryStore, Metric};
    use crate::types::{PassageId, PassageMetadata};
    use async_trait::async_trait;

    fn entry(record: &str, rating: f32, vector: Vec<f32>) -> IndexedEntry {
        IndexedEntry {
            id: PassageId::derive(record, 0),
            vector,
            text: record.to_string(),
            metadata: PassageMetadata {
                record_id: record.to_string(),
                product_id: None,
                rating: Some(rating),
                timestamp: None,
                reviewer_id: None,
                position: 0,
                offset: 0,
                aspect: None,
                sentiment: None,
                sentiment_score: None,
            },
        }
    }

    async fn seeded() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new(Metric::Dot));
        store
            .upsert(&[
                entry("a", 5.0, vec![0.9]),
                entry("b", 2.0, vec![0.8]),
                entry("c", 4.0, vec![0.1]),
            ])
            .await
            .unwrap();
        store
    }

    /// Ignores the filter it is given
    struct LeakyStore(Arc<InMemoryStore>);

    #[async_trait]
    impl VectorStore for LeakyStore {
        fn metric(&self) -> Metric {
            Metric::Dot
        }
        async fn dimension(&self) -> Option<usize> {
            self.0.dimension().await
        }
        async fn upsert(&self, entries: &[IndexedEntry]) -> Result<()> {
            self.0.upsert(entries).await
        }
        async fn query(
            &self,
            vector: &[f32],
            limit: usize,
            _filter: Option<&MetadataFilter>,
        ) -> Result<Vec<RetrievalResult>> {
            self.0.query(vector, limit, None).await
        }
        async fn delete(&self, ids: &[PassageId]) -> Result<()> {
            self.0.delete(ids).await
        }
        async fn count(&self) -> Result<usize> {
            self.0.count().await
        }
    }

    struct DownStore;

    #[async_trait]
    impl VectorStore for DownStore {
        fn metric(&self) -> Metric {
            Metric::Cosine
        }
        async fn dimension(&self) -> Option<usize> {
            None
        }
        async fn upsert(&self, _entries: &[IndexedEntry]) -> Result<()> {
            Err(RagError::Timeout { duration_ms: 1 })
        }
        async fn query(
            &self,
            _vector: &[f32],
            _limit: usize,
            _filter: Option<&MetadataFilter>,
        ) -> Result<Vec<RetrievalResult>> {
            Err(RagError::Timeout { duration_ms: 1 })
        }
        async fn delete(&self, _ids: &[PassageId]) -> Result<()> {
            Ok(())
        }
        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    fn retry() -> RetryManager {
        RetryManager::with_config(2, 1)
    }

    #[tokio::test]
    async fn test_top_k_in_score_order() {
        let retriever = Retriever::new(seeded().await, retry());
        let results = retriever.retrieve(&[1.0], &SearchParams::top_k(2)).await.unwrap();
        let records: Vec<&str> = results.iter().map(|r| r.metadata.record_id.as_str()).collect();
        assert_eq!(records, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_zero_k_is_empty() {
        let retriever = Retriever::new(seeded().await, retry());
        assert!(retriever.retrieve(&[1.0], &SearchParams::top_k(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filter_is_enforced_even_if_store_ignores_it() {
        let retriever = Retriever::new(Arc::new(LeakyStore(seeded().await)), retry());
        let params = SearchParams::top_k(3).with_filter(MetadataFilter {
            min_rating: Some(4.0),
            ..Default::default()
        });
        let results = retriever.retrieve(&[1.0], &params).await.unwrap();
        let records: Vec<&str> = results.iter().map(|r| r.metadata.record_id.as_str()).collect();
        assert_eq!(records, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_min_score() {
        let retriever = Retriever::new(seeded().await, retry()).with_min_score(Some(0.5));
        let results = retriever.retrieve(&[1.0], &SearchParams::top_k(5)).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_index_unavailable() {
        let retriever = Retriever::new(Arc::new(DownStore), retry());
        let result = retriever.retrieve(&[1.0], &SearchParams::top_k(1)).await;
        assert!(matches!(
            result,
            Err(RagError::IndexUnavailable { attempts: 2, .. })
        ));
    }
}
