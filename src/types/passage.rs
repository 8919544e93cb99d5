//! Passages and the metadata indexed alongside them

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::RagError;

/// Namespace for passage identifiers. Changing it orphans every indexed entry.
const PASSAGE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a9e_52d4_4b0e_9a37_0c5e_8d21_f4b3);

/// Stable passage identifier.
///
/// Derived from the owning record id and the passage's char offset, so
/// re-ingesting the same record yields the same keys and upserts overwrite
/// instead of duplicating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassageId(Uuid);

impl PassageId {
    pub fn derive(record_id: &str, offset: usize) -> Self {
        let name = format!("{}#{}", record_id, offset);
        Self(Uuid::new_v5(&PASSAGE_NAMESPACE, name.as_bytes()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PassageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PassageId {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| RagError::Generic(format!("invalid passage id '{}': {}", s, e)))
    }
}

/// A bounded slice of a record's normalized text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub id: PassageId,
    pub record_id: String,
    pub text: String,
    /// 0-based index within the record
    pub position: usize,
    /// Char offset into the record's normalized text
    pub offset: usize,
    /// Length in chars
    pub len: usize,
}

/// Coarse polarity of a passage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl FromStr for Sentiment {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            other => Err(RagError::ConfigError(format!("unknown sentiment '{}'", other))),
        }
    }
}

/// Everything stored next to a passage vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    pub record_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    pub position: usize,
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_score: Option<f32>,
}
