//! Process-local vector store
//!
//! Brute-force scoring over a hash map. Used by tests and small
//! experiments; nothing survives the process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    check_dimension, rank, IndexedEntry, MetadataFilter, Metric, RetrievalResult, VectorStore,
};
use crate::errors::Result;
use crate::types::PassageId;

struct Index {
    dimension: Option<usize>,
    entries: HashMap<PassageId, IndexedEntry>,
}

pub struct InMemoryStore {
    metric: Metric,
    index: RwLock<Index>,
}

impl InMemoryStore {
    /// Empty store; the dimension is locked by the first upsert
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            index: RwLock::new(Index {
                dimension: None,
                entries: HashMap::new(),
            }),
        }
    }

    /// Empty store with a fixed dimension
    pub fn with_dimension(metric: Metric, dimension: usize) -> Self {
        Self {
            metric,
            index: RwLock::new(Index {
                dimension: Some(dimension),
                entries: HashMap::new(),
            }),
        }
    }

    /// Snapshot of a stored entry
    pub async fn get(&self, id: &PassageId) -> Option<IndexedEntry> {
        self.index.read().await.entries.get(id).cloned()
    }

    /// Snapshot of all stored ids, sorted
    pub async fn ids(&self) -> Vec<PassageId> {
        let index = self.index.read().await;
        let mut ids: Vec<PassageId> = index.entries.keys().copied().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn metric(&self) -> Metric {
        self.metric
    }

    async fn dimension(&self) -> Option<usize> {
        self.index.read().await.dimension
    }

    async fn upsert(&self, entries: &[IndexedEntry]) -> Result<()> {
        let mut index = self.index.write().await;

        // Validate the whole batch before touching the map
        let mut dimension = index.dimension;
        for entry in entries {
            match dimension {
                Some(expected) => check_dimension(expected, &entry.vector)?,
                None => dimension = Some(entry.vector.len()),
            }
        }
        index.dimension = dimension;

        for entry in entries {
            index.entries.insert(entry.id, entry.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        let index = self.index.read().await;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(expected) = index.dimension else {
            return Ok(Vec::new());
        };
        check_dimension(expected, vector)?;

        let mut results: Vec<RetrievalResult> = index
            .entries
            .values()
            .filter(|entry| filter.map_or(true, |f| f.matches(&entry.metadata)))
            .map(|entry| RetrievalResult {
                passage_id: entry.id,
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score: self.metric.score(vector, &entry.vector),
            })
            .collect();

        results.sort_by(rank);
        results.truncate(limit);
        Ok(results)
    }

    async fn delete(&self, ids: &[PassageId]) -> Result<()> {
        let mut index = self.index.write().await;
        for id in ids {
            index.entries.remove(id);
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.index.read().await.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RagError;
    use crate::types::PassageMetadata;

    fn entry(record: &str, offset: usize, vector: Vec<f32>) -> IndexedEntry {
        IndexedEntry {
            id: PassageId::derive(record, offset),
            vector,
            text: format!("{} at {}", record, offset),
            metadata: PassageMetadata {
                record_id: record.to_string(),
                product_id: Some(format!("p-{}", record)),
                rating: None,
                timestamp: None,
                reviewer_id: None,
                position: 0,
                offset,
                aspect: None,
                sentiment: None,
                sentiment_score: None,
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_is_keyed() {
        let store = InMemoryStore::new(Metric::Cosine);
        store.upsert(&[entry("r1", 0, vec![1.0, 0.0])]).await.unwrap();
        store.upsert(&[entry("r1", 0, vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.dimension().await, Some(2));

        let stored = store.get(&PassageId::derive("r1", 0)).await.unwrap();
        assert_eq!(stored.vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejects_batch() {
        let store = InMemoryStore::with_dimension(Metric::Cosine, 2);
        let result = store
            .upsert(&[entry("r1", 0, vec![1.0, 0.0]), entry("r2", 0, vec![1.0])])
            .await;
        assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_orders_and_filters() {
        let store = InMemoryStore::new(Metric::Dot);
        store
            .upsert(&[
                entry("r1", 0, vec![1.0, 0.0]),
                entry("r2", 0, vec![0.5, 0.0]),
                entry("r3", 0, vec![0.9, 0.1]),
            ])
            .await
            .unwrap();

        let results = store.query(&[1.0, 0.0], 2, None).await.unwrap();
        let records: Vec<&str> = results.iter().map(|r| r.metadata.record_id.as_str()).collect();
        assert_eq!(records, vec!["r1", "r3"]);

        let filter = MetadataFilter {
            product_id: Some("p-r2".to_string()),
            ..Default::default()
        };
        let filtered = store.query(&[1.0, 0.0], 5, Some(&filter)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].metadata.record_id, "r2");
    }

    #[tokio::test]
    async fn test_ties_break_by_passage_id() {
        let store = InMemoryStore::new(Metric::Dot);
        store
            .upsert(&[entry("a", 0, vec![1.0]), entry("b", 0, vec![1.0]), entry("c", 0, vec![1.0])])
            .await
            .unwrap();

        let results = store.query(&[1.0], 3, None).await.unwrap();
        let ids: Vec<PassageId> = results.iter().map(|r| r.passage_id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_empty_store_and_zero_limit() {
        let store = InMemoryStore::new(Metric::Cosine);
        assert!(store.query(&[1.0], 3, None).await.unwrap().is_empty());

        store.upsert(&[entry("r1", 0, vec![1.0])]).await.unwrap();
        assert!(store.query(&[1.0], 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new(Metric::Cosine);
        store
            .upsert(&[entry("r1", 0, vec![1.0]), entry("r2", 0, vec![1.0])])
            .await
            .unwrap();
        store
            .delete(&[PassageId::derive("r1", 0), PassageId::derive("zz", 0)])
            .await
            .unwrap();
        assert_eq!(store.ids().await, vec![PassageId::derive("r2", 0)]);
    }
}
