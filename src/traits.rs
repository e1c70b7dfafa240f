use crate::filter::MetadataFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A scalar metadata value as stored alongside a vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetadataValue {
    /// Numeric view used by ordering comparisons; ints and floats compare alike.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(v) => Some(*v as f64),
            MetadataValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Equality that treats `Int(3)` and `Float(3.0)` as the same value.
    pub fn loosely_equals(&self, other: &MetadataValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(v) => write!(f, "{}", v),
            MetadataValue::Int(v) => write!(f, "{}", v),
            MetadataValue::Float(v) => write!(f, "{}", v),
            MetadataValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Str(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        MetadataValue::Int(i64::from(value))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Metadata attached to an indexed vector, keyed by field name.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// The unit handed to a [`VectorIndex`] for storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub document: Option<String>,
}

/// One nearest-neighbor match. Smaller distance means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub distance: f64,
    pub metadata: Metadata,
    pub document: Option<String>,
}

/// A record returned by [`VectorIndex::get`]; fields not requested are `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoredRecord {
    pub id: String,
    pub metadata: Option<Metadata>,
    pub document: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// Which optional fields a [`GetRequest`] should load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Include {
    pub metadatas: bool,
    pub documents: bool,
    pub embeddings: bool,
}

impl Include {
    pub fn metadatas() -> Self {
        Include {
            metadatas: true,
            ..Default::default()
        }
    }
}

/// Record lookup by id and/or metadata predicate.
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    pub ids: Option<Vec<String>>,
    pub filter: Option<MetadataFilter>,
    pub include: Include,
}

/// Turns audio files and text into vectors living in one shared space.
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Performs any deferred initialization so failures surface before work starts.
    fn ensure_ready(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Embeds audio files; returns one vector per path, in input order.
    fn embed_audio(&self, paths: &[PathBuf]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embeds text queries; returns one vector per text, in input order.
    fn embed_text(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// A single named collection of vectors ranked by cosine distance.
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Inserts or replaces records by id.
    fn upsert(&self, records: &[IndexedVector]) -> anyhow::Result<()>;

    /// Returns at most `k` hits in ascending distance order.
    fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> anyhow::Result<Vec<SearchHit>>;

    fn get(&self, request: &GetRequest) -> anyhow::Result<Vec<StoredRecord>>;

    fn count(&self) -> anyhow::Result<usize>;
}
