//! Qdrant-backed vector store
//!
//! One collection holds every passage. Point ids are the passage UUIDs and
//! the payload carries the passage text next to its metadata fields, so
//! server-side filters work on plain payload keys.

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, vectors_config::Config, Condition,
    CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, PointsIdsList, Range, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::RwLock;

use super::rank;
use super::{check_dimension, IndexedEntry, MetadataFilter, Metric, RetrievalResult, VectorStore};
use crate::config::StoreConfig;
use crate::errors::{Dependency, RagError, Result};
use crate::retry::RetryManager;
use crate::types::{PassageId, PassageMetadata};

/// Payload key holding the passage text
const TEXT_KEY: &str = "text";

/// Vector store using a remote Qdrant collection
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    metric: Metric,
    /// Known once the collection exists
    dimension: RwLock<Option<usize>>,
}

impl QdrantStore {
    /// Connect and open the configured collection.
    ///
    /// An existing collection must use the configured metric and, when
    /// `dimension` is given, that vector size. A missing collection is
    /// created now if the dimension is known, otherwise on first upsert.
    pub async fn connect(
        config: &StoreConfig,
        dimension: Option<usize>,
        retry: &RetryManager,
    ) -> Result<Self> {
        let store = Self::open(config, retry)?;

        let exists = retry
            .execute_with_retry(Dependency::Index, || async {
                Ok(store.client.collection_exists(store.collection.as_str()).await?)
            })
            .await?;

        if exists {
            let (metric, size) = retry
                .execute_with_retry(Dependency::Index, || store.describe())
                .await?;
            if metric != store.metric {
                return Err(RagError::MetricMismatch {
                    expected: store.metric.as_str().to_string(),
                    actual: metric.as_str().to_string(),
                });
            }
            if let Some(configured) = dimension {
                if configured != size {
                    return Err(RagError::DimensionMismatch {
                        expected: size,
                        actual: configured,
                    });
                }
            }
            *store.dimension.write().await = Some(size);
            tracing::info!(collection = %store.collection, dimension = size, "opened existing collection");
        } else if let Some(size) = dimension {
            retry
                .execute_with_retry(Dependency::Index, || store.create(size))
                .await?;
            *store.dimension.write().await = Some(size);
        }

        Ok(store)
    }

    /// Client for the configured collection without inspecting it. Enough
    /// for [`drop_collection`](Self::drop_collection) even when the
    /// collection would fail the checks in [`connect`](Self::connect).
    pub fn open(config: &StoreConfig, retry: &RetryManager) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .api_key(config.api_key.clone())
            .timeout(retry.call_timeout())
            .build()?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            metric: config.metric,
            dimension: RwLock::new(None),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Metric and vector size of the existing collection
    async fn describe(&self) -> Result<(Metric, usize)> {
        let info = self.client.collection_info(self.collection.as_str()).await?;
        let params = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        match params {
            Some(Config::Params(params)) => {
                let metric = if params.distance == Distance::Cosine as i32 {
                    Metric::Cosine
                } else if params.distance == Distance::Dot as i32 {
                    Metric::Dot
                } else {
                    let actual = Distance::try_from(params.distance)
                        .map(|d| d.as_str_name().to_lowercase())
                        .unwrap_or_else(|_| params.distance.to_string());
                    return Err(RagError::MetricMismatch {
                        expected: self.metric.as_str().to_string(),
                        actual,
                    });
                };
                Ok((metric, params.size as usize))
            }
            _ => Err(RagError::ConfigError(format!(
                "collection '{}' does not use a single unnamed vector",
                self.collection
            ))),
        }
    }

    async fn create(&self, dimension: usize) -> Result<()> {
        let distance = match self.metric {
            Metric::Cosine => Distance::Cosine,
            Metric::Dot => Distance::Dot,
        };
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, distance)),
            )
            .await?;
        tracing::info!(collection = %self.collection, dimension, metric = self.metric.as_str(), "created collection");
        Ok(())
    }

    /// Create the collection on first write, or check the vector size
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        if let Some(expected) = *self.dimension.read().await {
            return if expected == dimension {
                Ok(())
            } else {
                Err(RagError::DimensionMismatch {
                    expected,
                    actual: dimension,
                })
            };
        }

        let mut slot = self.dimension.write().await;
        match *slot {
            Some(expected) if expected != dimension => Err(RagError::DimensionMismatch {
                expected,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                if !self.client.collection_exists(self.collection.as_str()).await? {
                    self.create(dimension).await?;
                }
                *slot = Some(dimension);
                Ok(())
            }
        }
    }

    /// Delete the whole collection. Returns whether it existed.
    pub async fn drop_collection(&self) -> Result<bool> {
        let mut slot = self.dimension.write().await;
        let existed = self.client.collection_exists(self.collection.as_str()).await?;
        if existed {
            self.client.delete_collection(self.collection.as_str()).await?;
            tracing::info!(collection = %self.collection, "dropped collection");
        }
        *slot = None;
        Ok(existed)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn metric(&self) -> Metric {
        self.metric
    }

    async fn dimension(&self) -> Option<usize> {
        *self.dimension.read().await
    }

    async fn upsert(&self, entries: &[IndexedEntry]) -> Result<()> {
        let Some(first) = entries.first() else {
            return Ok(());
        };
        let dimension = first.vector.len();
        for entry in entries {
            check_dimension(dimension, &entry.vector)?;
        }
        self.ensure_collection(dimension).await?;

        let points = entries
            .iter()
            .map(to_point)
            .collect::<Result<Vec<PointStruct>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(expected) = *self.dimension.read().await else {
            return Ok(Vec::new());
        };
        check_dimension(expected, vector)?;

        let mut request =
            SearchPointsBuilder::new(&self.collection, vector.to_vec(), limit as u64).with_payload(true);
        if let Some(qdrant_filter) = filter.and_then(to_qdrant_filter) {
            request = request.filter(qdrant_filter);
        }

        let response = self.client.search_points(request).await?;
        let mut results: Vec<RetrievalResult> = response
            .result
            .into_iter()
            .filter_map(|point| match from_scored_point(point) {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed point");
                    None
                }
            })
            .collect();

        results.sort_by(rank);
        Ok(results)
    }

    async fn delete(&self, ids: &[PassageId]) -> Result<()> {
        if ids.is_empty() || self.dimension.read().await.is_none() {
            return Ok(());
        }

        let ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.to_string())).collect();
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        if self.dimension.read().await.is_none() {
            return Ok(0);
        }
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}

fn to_point(entry: &IndexedEntry) -> Result<PointStruct> {
    let mut payload = match serde_json::to_value(&entry.metadata)? {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert(TEXT_KEY.to_string(), JsonValue::String(entry.text.clone()));

    let payload = Payload::try_from(JsonValue::Object(payload))?;
    Ok(PointStruct::new(
        entry.id.to_string(),
        entry.vector.clone(),
        payload,
    ))
}

fn from_scored_point(point: ScoredPoint) -> Result<RetrievalResult> {
    let passage_id: PassageId = point_id_to_string(&point.id).parse()?;

    let mut fields = Map::new();
    for (key, value) in point.payload {
        if let Some(json) = qdrant_to_json_value(&value) {
            fields.insert(key, json);
        }
    }
    let text = match fields.remove(TEXT_KEY) {
        Some(JsonValue::String(text)) => text,
        _ => {
            return Err(RagError::Generic(format!(
                "point {} has no passage text",
                passage_id
            )))
        }
    };
    let metadata: PassageMetadata = serde_json::from_value(JsonValue::Object(fields))?;

    Ok(RetrievalResult {
        passage_id,
        text,
        metadata,
        score: point.score,
    })
}

/// f32 to f64 through its shortest decimal form, matching how the payload
/// stored it
fn widen(value: f32) -> f64 {
    value.to_string().parse().unwrap_or(value as f64)
}

fn to_qdrant_filter(filter: &MetadataFilter) -> Option<Filter> {
    let mut conditions = Vec::new();

    if let Some(product) = &filter.product_id {
        conditions.push(Condition::matches("product_id", product.clone()));
    }
    if filter.min_rating.is_some() || filter.max_rating.is_some() {
        conditions.push(Condition::range(
            "rating",
            Range {
                gte: filter.min_rating.map(widen),
                lte: filter.max_rating.map(widen),
                ..Default::default()
            },
        ));
    }
    if filter.since.is_some() || filter.until.is_some() {
        conditions.push(Condition::range(
            "timestamp",
            Range {
                gte: filter.since.map(|v| v as f64),
                lte: filter.until.map(|v| v as f64),
                ..Default::default()
            },
        ));
    }
    if let Some(sentiment) = filter.sentiment {
        conditions.push(Condition::matches("sentiment", sentiment.as_str().to_string()));
    }
    if let Some(aspect) = &filter.aspect {
        conditions.push(Condition::matches("aspect", aspect.clone()));
    }

    if conditions.is_empty() {
        None
    } else {
        Some(Filter::must(conditions))
    }
}

fn qdrant_to_json_value(value: &QdrantValue) -> Option<JsonValue> {
    value.kind.as_ref().and_then(|kind| match kind {
        Kind::StringValue(s) => Some(JsonValue::String(s.clone())),
        Kind::IntegerValue(i) => Some(JsonValue::Number((*i).into())),
        Kind::DoubleValue(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number),
        Kind::BoolValue(b) => Some(JsonValue::Bool(*b)),
        Kind::NullValue(_) => Some(JsonValue::Null),
        _ => None,
    })
}

fn point_id_to_string(point_id: &Option<PointId>) -> String {
    point_id
        .as_ref()
        .and_then(|id| match &id.point_id_options {
            Some(PointIdOptions::Num(n)) => Some(n.to_string()),
            Some(PointIdOptions::Uuid(u)) => Some(u.clone()),
            None => None,
        })
        .unwrap_or_default()
}
