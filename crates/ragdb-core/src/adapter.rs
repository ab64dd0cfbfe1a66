//! Adapter contract
//!
//! Every vector backend implements [`VectorDbAdapter`]. Backends without a
//! native bulk primitive inherit the sequential `insert_batch` /
//! `delete_batch` defaults; backends that have one override them.
//!
//! [`AdapterBase`] carries the state every adapter shares: the resolved
//! embedding dimension and the created/ready/closed lifecycle.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::{
    AdapterInfo, AdapterOptions, BatchOperation, DocumentPatch, Filter, ListOptions, RagDbError,
    Result, SearchOptions, VectorDocument, VectorSearchResult,
};

/// Dimension used when `options.dimension` is not set (OpenAI text-embedding-3-small)
pub const DEFAULT_DIMENSION: usize = 1536;

// ============================================================================
// Trait
// ============================================================================

/// Uniform operation set for a vector backend.
///
/// Lifecycle methods take `&mut self`, so initialize/close can never race with
/// each other; everything else takes `&self` and may run concurrently.
#[async_trait]
pub trait VectorDbAdapter: Send + Sync {
    /// Connect to the backend and prepare the collection
    async fn initialize(&mut self) -> Result<()>;

    /// Store one document and return its id.
    ///
    /// A caller-supplied id is kept; otherwise one is assigned.
    async fn insert(&self, document: VectorDocument) -> Result<String>;

    /// Store documents, returning ids in input order.
    ///
    /// The default inserts one at a time and stops at the first failure,
    /// leaving earlier items stored.
    async fn insert_batch(&self, documents: Vec<VectorDocument>) -> Result<Vec<String>> {
        insert_sequential(self, documents).await
    }

    /// Nearest neighbours of `embedding`, best match first
    async fn search(
        &self,
        embedding: &[f32],
        options: SearchOptions,
    ) -> Result<Vec<VectorSearchResult>>;

    /// Merge `patch` into the stored document
    async fn update(&self, id: &str, patch: DocumentPatch) -> Result<()>;

    /// Remove one document. Behavior for unknown ids is reported by
    /// `info().capabilities.delete_missing`.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Remove documents. Same partial-effect policy as `insert_batch`.
    async fn delete_batch(&self, ids: &[String]) -> Result<()> {
        delete_sequential(self, ids).await
    }

    /// Fetch one document; `None` when absent
    async fn get(&self, id: &str) -> Result<Option<VectorDocument>>;

    /// Number of documents matching `filter` (all when `None`)
    async fn count(&self, filter: Option<&Filter>) -> Result<usize>;

    /// Documents in a stable backend-defined order
    async fn list(&self, options: ListOptions) -> Result<Vec<VectorDocument>>;

    /// Document counts grouped by a metadata key.
    ///
    /// Only backends advertising `capabilities.grouped_count` implement this.
    async fn grouped_count(&self, key: &str) -> Result<BTreeMap<String, usize>> {
        Err(RagDbError::StorageError(format!(
            "{} adapter does not support grouped counts (key: {key})",
            self.info().provider
        )))
    }

    /// Release backend resources
    async fn close(&mut self) -> Result<()>;

    /// Provider identity and capabilities
    fn info(&self) -> AdapterInfo;

    /// Configured embedding length
    fn dimension(&self) -> usize;
}

// ============================================================================
// Default batching
// ============================================================================

/// Insert documents one at a time, in order, failing fast.
pub async fn insert_sequential<A>(
    adapter: &A,
    documents: Vec<VectorDocument>,
) -> Result<Vec<String>>
where
    A: VectorDbAdapter + ?Sized,
{
    debug!(count = documents.len(), "Sequential batch insert");

    let mut ids = Vec::with_capacity(documents.len());
    for (index, document) in documents.into_iter().enumerate() {
        let supplied_id = document.id.clone();
        match adapter.insert(document).await {
            Ok(id) => ids.push(id),
            Err(source) => {
                warn!(index, error = %source, "Batch insert aborted");
                return Err(RagDbError::BatchFailed {
                    operation: BatchOperation::Insert,
                    index,
                    id: supplied_id,
                    completed: ids,
                    source: Box::new(source),
                });
            }
        }
    }

    Ok(ids)
}

/// Delete ids one at a time, in order, failing fast.
pub async fn delete_sequential<A>(adapter: &A, ids: &[String]) -> Result<()>
where
    A: VectorDbAdapter + ?Sized,
{
    debug!(count = ids.len(), "Sequential batch delete");

    for (index, id) in ids.iter().enumerate() {
        if let Err(source) = adapter.delete(id).await {
            warn!(index, id = %id, error = %source, "Batch delete aborted");
            return Err(RagDbError::BatchFailed {
                operation: BatchOperation::Delete,
                index,
                id: Some(id.clone()),
                completed: ids[..index].to_vec(),
                source: Box::new(source),
            });
        }
    }

    Ok(())
}

// ============================================================================
// Shared base
// ============================================================================

/// Adapter lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Ready,
    Closed,
}

/// State and validation shared by every adapter
#[derive(Debug, Clone)]
pub struct AdapterBase {
    provider: &'static str,
    dimension: usize,
    lifecycle: Lifecycle,
}

impl AdapterBase {
    /// Resolve the dimension once from `options`
    pub fn new(provider: &'static str, options: &AdapterOptions) -> Result<Self> {
        let dimension = options.dimension.unwrap_or(DEFAULT_DIMENSION);
        if dimension == 0 {
            return Err(RagDbError::ConfigurationError(format!(
                "{provider}: dimension must be greater than zero"
            )));
        }

        Ok(Self {
            provider,
            dimension,
            lifecycle: Lifecycle::Created,
        })
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Guard for data operations
    pub fn ensure_ready(&self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Created => Err(RagDbError::ConnectionError(format!(
                "{} adapter has not been initialized",
                self.provider
            ))),
            Lifecycle::Closed => Err(RagDbError::Closed),
        }
    }

    /// Guard for `initialize`
    pub fn ensure_initializable(&self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Created => Ok(()),
            Lifecycle::Ready => Err(RagDbError::ConfigurationError(format!(
                "{} adapter is already initialized",
                self.provider
            ))),
            Lifecycle::Closed => Err(RagDbError::Closed),
        }
    }

    pub fn mark_ready(&mut self) {
        self.lifecycle = Lifecycle::Ready;
    }

    /// Transition to closed. Fails when already closed.
    pub fn mark_closed(&mut self) -> Result<()> {
        if self.lifecycle == Lifecycle::Closed {
            return Err(RagDbError::Closed);
        }
        self.lifecycle = Lifecycle::Closed;
        Ok(())
    }

    /// Check an embedding against the configured dimension
    pub fn validate_embedding(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(RagDbError::ValidationError(format!(
                "embedding has {} dimensions, expected {}",
                embedding.len(),
                self.dimension
            )));
        }
        if let Some(position) = embedding.iter().position(|v| !v.is_finite()) {
            return Err(RagDbError::ValidationError(format!(
                "embedding component {position} is not finite"
            )));
        }
        Ok(())
    }

    /// Check a document before it is written
    pub fn validate_document(&self, document: &VectorDocument) -> Result<()> {
        if document.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(RagDbError::ValidationError(
                "document id must not be empty".to_string(),
            ));
        }
        self.validate_embedding(&document.embedding)
    }

    /// Ensure the document has an id, assigning a UUID v4 when absent
    pub fn assign_id(document: &mut VectorDocument) -> String {
        document
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone()
    }
}
