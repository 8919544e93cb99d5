use serde::{Deserialize, Serialize};

/// A validated, normalized review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// Unique within one ingestion run
    pub id: String,
    pub product_id: Option<String>,
    /// Normalized review text, never empty
    pub text: String,
    /// Star rating in `0..=5`
    pub rating: Option<f32>,
    /// Epoch milliseconds
    pub timestamp: Option<i64>,
    pub reviewer_id: Option<String>,
}

impl ReviewRecord {
    /// Minimal record with only the required fields
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            product_id: None,
            text: text.into(),
            rating: None,
            timestamp: None,
            reviewer_id: None,
        }
    }

    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    pub fn with_rating(mut self, rating: f32) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_reviewer(mut self, reviewer_id: impl Into<String>) -> Self {
        self.reviewer_id = Some(reviewer_id.into());
        self
    }
}
