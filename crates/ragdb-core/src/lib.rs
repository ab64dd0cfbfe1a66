//! ragdb Core - Data model, adapter contract, and shared types
//!
//! This crate defines the abstractions every vector backend plugs into:
//! - Vector documents, partial patches, and search results
//! - Metadata filters
//! - Common error types
//! - The `VectorDbAdapter` trait and its shared base helper
//! - Configuration management
//!
//! Author: hephaex@gmail.com

pub mod adapter;
pub mod config;
pub mod filter;

pub use adapter::{
    delete_sequential, insert_sequential, AdapterBase, Lifecycle, VectorDbAdapter,
    DEFAULT_DIMENSION,
};
pub use config::{AdapterOptions, AppConfig, ConfigError, LoggingConfig, VectorDbConfig};
pub use filter::{Condition, Filter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for ragdb operations
#[derive(Error, Debug)]
pub enum RagDbError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Adapter is closed")]
    Closed,

    /// A sequential batch stopped at `index`. Items before it were applied.
    #[error(
        "Batch {operation} failed at item {index} (id: {}): {source}",
        .id.as_deref().unwrap_or("unassigned")
    )]
    BatchFailed {
        operation: BatchOperation,
        index: usize,
        id: Option<String>,
        /// Ids of the items that were applied before the failure, in input order
        completed: Vec<String>,
        #[source]
        source: Box<RagDbError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RagDbError {
    /// Kind of the underlying failure, looking through batch wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigurationError(_) => ErrorKind::Configuration,
            Self::ConnectionError(_) => ErrorKind::Connection,
            Self::ValidationError(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::StorageError(_) => ErrorKind::Storage,
            Self::Closed => ErrorKind::Closed,
            Self::BatchFailed { source, .. } => source.kind(),
            Self::Other(_) => ErrorKind::Other,
        }
    }
}

/// Coarse classification of [`RagDbError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connection,
    Validation,
    NotFound,
    Storage,
    Closed,
    Other,
}

/// Batch operation named in [`RagDbError::BatchFailed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Insert,
    Delete,
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

pub type Result<T> = std::result::Result<T, RagDbError>;

// ============================================================================
// Documents
// ============================================================================

/// Open metadata mapping attached to every document
pub type Metadata = HashMap<String, serde_json::Value>;

/// Well-known metadata keys. Callers own the schema; nothing here is enforced.
pub mod metadata_keys {
    pub const TITLE: &str = "title";
    pub const URL: &str = "url";
    pub const SOURCE_TYPE: &str = "sourceType";
    pub const CREATED_AT: &str = "createdAt";
}

/// A stored embedding with its content and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    /// Unique identifier, assigned on insert when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Embedding vector (length must equal the adapter dimension)
    pub embedding: Vec<f32>,

    /// Original text payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Caller-defined metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl VectorDocument {
    /// Create a document without id, content, or metadata
    pub fn new(embedding: Vec<f32>) -> Self {
        Self {
            id: None,
            embedding,
            content: None,
            metadata: HashMap::new(),
        }
    }

    /// Set a caller-chosen id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set content text
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Add a metadata value
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set `metadata.sourceType`
    pub fn with_source_type(self, source_type: impl Into<String>) -> Self {
        self.with_metadata(metadata_keys::SOURCE_TYPE, source_type.into())
    }

    /// Set `metadata.createdAt` as an RFC 3339 timestamp
    pub fn with_created_at(self, created_at: DateTime<Utc>) -> Self {
        self.with_metadata(metadata_keys::CREATED_AT, created_at.to_rfc3339())
    }

    pub fn source_type(&self) -> Option<&str> {
        self.metadata
            .get(metadata_keys::SOURCE_TYPE)
            .and_then(|v| v.as_str())
    }

    /// Merge a partial update into this document.
    ///
    /// Metadata is merged key by key; a `null` patch value removes the key.
    pub fn apply_patch(&mut self, patch: DocumentPatch) {
        if let Some(embedding) = patch.embedding {
            self.embedding = embedding;
        }
        if let Some(content) = patch.content {
            self.content = Some(content);
        }
        if let Some(metadata) = patch.metadata {
            for (key, value) in metadata {
                if value.is_null() {
                    self.metadata.remove(&key);
                } else {
                    self.metadata.insert(key, value);
                }
            }
        }
    }
}

/// Partial update for a stored document. Only supplied fields change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl DocumentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set (or with `null`, remove) one metadata key
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.embedding.is_none() && self.content.is_none() && self.metadata.is_none()
    }
}

// ============================================================================
// Search and Listing
// ============================================================================

/// Default number of nearest neighbours returned by `search`
pub const DEFAULT_SEARCH_K: usize = 10;

/// A document matched by a similarity search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchResult {
    pub document: VectorDocument,

    /// Similarity or distance, per the adapter's metric
    pub score: f32,

    /// 0-based position in the result ordering
    pub rank: usize,
}

/// Options for `search`
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum number of results (defaults to [`DEFAULT_SEARCH_K`])
    pub k: Option<usize>,

    /// Metadata predicate restricting candidates
    pub filter: Option<Filter>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(&self) -> usize {
        self.k.unwrap_or(DEFAULT_SEARCH_K)
    }
}

/// Options for `list`
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Maximum number of documents; `None` lists everything after `offset`
    pub limit: Option<usize>,

    /// Number of matching documents to skip
    pub offset: usize,

    pub filter: Option<Filter>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// How two embeddings are compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Dot,
    Euclidean,
}

impl DistanceMetric {
    /// Whether larger scores are better matches (similarity) or worse (distance)
    pub fn higher_is_better(self) -> bool {
        !matches!(self, Self::Euclidean)
    }

    /// Score `b` against query `a`. Both slices must have equal length.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }

    /// Orders scores best match first
    pub fn compare(self, a: f32, b: f32) -> Ordering {
        if self.higher_is_better() {
            b.total_cmp(&a)
        } else {
            a.total_cmp(&b)
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Dot => write!(f, "dot"),
            Self::Euclidean => write!(f, "euclidean"),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            "euclidean" | "euclid" => Ok(Self::Euclidean),
            _ => Err(ConfigError::InvalidValue {
                key: "VECTOR_METRIC".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Cosine similarity in [-1, 1]; 0.0 when either vector has zero magnitude
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

// ============================================================================
// Adapter Identity
// ============================================================================

/// What `delete` does when the id is not stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMissing {
    /// Succeeds without effect
    NoOp,
    /// Fails with [`RagDbError::NotFound`]
    NotFound,
}

/// Optional features a backend supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// `filter` is honoured by search, count, and list
    pub metadata_filtering: bool,

    /// Caller-supplied ids are preserved on insert
    pub custom_ids: bool,

    /// `insert_batch` is a single backend request
    pub native_batch_insert: bool,

    /// `delete_batch` is a single backend request
    pub native_batch_delete: bool,

    /// `grouped_count` is implemented natively
    pub grouped_count: bool,

    /// Data outlives the process
    pub persistent: bool,

    pub delete_missing: DeleteMissing,

    pub metric: DistanceMetric,
}

/// Static identity of an adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub provider: String,
    pub version: String,
    pub capabilities: Capabilities,
}

// ============================================================================
// Statistics
// ============================================================================

/// Aggregate counts over stored documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_items: usize,
    pub by_source_type: BTreeMap<String, usize>,
}

impl Stats {
    /// Category used when a document has no `sourceType`
    pub const UNKNOWN_SOURCE: &'static str = "unknown";

    /// Bucket name for a metadata value: strings as-is, absent or null as
    /// `"unknown"`, anything else as its JSON text
    pub fn bucket_for(value: Option<&serde_json::Value>) -> String {
        match value {
            None | Some(serde_json::Value::Null) => Self::UNKNOWN_SOURCE.to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Count one document into `by_source_type`
    pub fn record(&mut self, document: &VectorDocument) {
        let bucket = Self::bucket_for(document.metadata.get(metadata_keys::SOURCE_TYPE));
        *self.by_source_type.entry(bucket).or_insert(0) += 1;
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total items: {}", self.total_items)?;
        for (source_type, count) in self.by_source_type.iter().filter(|(_, c)| **c > 0) {
            writeln!(f, "  {source_type}: {count}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
