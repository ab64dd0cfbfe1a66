//! In-memory vector storage and search
//!
//! A dependency-free backend: documents live in process memory behind an
//! async `RwLock`, search is a linear scan, and listing follows insertion
//! order. An optional JSON snapshot (`options.path`) is loaded on
//! `initialize` and written on `close`.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use ragdb_core::filter::matches_optional;
use ragdb_core::{
    AdapterBase, AdapterInfo, AdapterOptions, Capabilities, DeleteMissing, DistanceMetric,
    DocumentPatch, Filter, Lifecycle, ListOptions, RagDbError, Result, SearchOptions, Stats,
    VectorDbAdapter, VectorDocument, VectorSearchResult,
};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::persistence::{load_snapshot, save_snapshot, MemorySnapshot};

pub const PROVIDER: &str = "memory";

/// Documents keyed by insertion sequence, plus an id index
#[derive(Debug, Default)]
struct MemoryState {
    next_seq: u64,
    documents: BTreeMap<u64, VectorDocument>,
    index: HashMap<String, u64>,
}

impl MemoryState {
    /// Insert or replace; a replaced document keeps its list position
    fn upsert(&mut self, id: String, document: VectorDocument) {
        let seq = match self.index.get(&id) {
            Some(seq) => *seq,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.index.insert(id, seq);
                seq
            }
        };
        self.documents.insert(seq, document);
    }

    fn get(&self, id: &str) -> Option<&VectorDocument> {
        self.index.get(id).and_then(|seq| self.documents.get(seq))
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut VectorDocument> {
        let seq = *self.index.get(id)?;
        self.documents.get_mut(&seq)
    }

    fn remove(&mut self, id: &str) -> Option<VectorDocument> {
        let seq = self.index.remove(id)?;
        self.documents.remove(&seq)
    }

    fn matching<'a>(
        &'a self,
        filter: Option<&'a Filter>,
    ) -> impl Iterator<Item = &'a VectorDocument> + 'a {
        self.documents
            .values()
            .filter(move |doc| matches_optional(filter, &doc.metadata))
    }
}

/// In-process vector store
pub struct MemoryAdapter {
    base: AdapterBase,
    metric: DistanceMetric,
    snapshot_path: Option<PathBuf>,
    state: RwLock<MemoryState>,
}

impl MemoryAdapter {
    pub fn new(options: &AdapterOptions) -> Result<Self> {
        Ok(Self {
            base: AdapterBase::new(PROVIDER, options)?,
            metric: options.metric.unwrap_or_default(),
            snapshot_path: options.path.clone(),
            state: RwLock::new(MemoryState::default()),
        })
    }

    async fn restore(&mut self) -> Result<usize> {
        let Some(path) = &self.snapshot_path else {
            return Ok(0);
        };
        let Some(snapshot) = load_snapshot(path).await? else {
            debug!(path = %path.display(), "No snapshot to restore");
            return Ok(0);
        };

        if snapshot.dimension != self.base.dimension() {
            return Err(RagDbError::ConfigurationError(format!(
                "snapshot {} has dimension {}, adapter is configured for {}",
                path.display(),
                snapshot.dimension,
                self.base.dimension()
            )));
        }
        if snapshot.metric != self.metric {
            return Err(RagDbError::ConfigurationError(format!(
                "snapshot {} was written with the {} metric, adapter is configured for {}",
                path.display(),
                snapshot.metric,
                self.metric
            )));
        }

        let state = self.state.get_mut();
        let count = snapshot.documents.len();
        for mut document in snapshot.documents {
            self.base.validate_document(&document)?;
            let id = AdapterBase::assign_id(&mut document);
            state.upsert(id, document);
        }

        Ok(count)
    }
}

#[async_trait]
impl VectorDbAdapter for MemoryAdapter {
    async fn initialize(&mut self) -> Result<()> {
        self.base.ensure_initializable()?;
        let restored = self.restore().await?;
        self.base.mark_ready();

        info!(
            dimension = self.base.dimension(),
            metric = %self.metric,
            restored,
            "Memory vector store initialized"
        );
        Ok(())
    }

    async fn insert(&self, mut document: VectorDocument) -> Result<String> {
        self.base.ensure_ready()?;
        self.base.validate_document(&document)?;

        let id = AdapterBase::assign_id(&mut document);
        self.state.write().await.upsert(id.clone(), document);

        debug!(id = %id, "Inserted document");
        Ok(id)
    }

    async fn search(
        &self,
        embedding: &[f32],
        options: SearchOptions,
    ) -> Result<Vec<VectorSearchResult>> {
        self.base.ensure_ready()?;
        self.base.validate_embedding(embedding)?;

        let k = options.limit();
        if k == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let mut scored: Vec<(f32, &VectorDocument)> = state
            .matching(options.filter.as_ref())
            .map(|doc| (self.metric.score(embedding, &doc.embedding), doc))
            .collect();

        // Stable sort: equal scores stay in insertion order
        scored.sort_by(|a, b| self.metric.compare(a.0, b.0));

        Ok(scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, (score, doc))| VectorSearchResult {
                document: doc.clone(),
                score,
                rank,
            })
            .collect())
    }

    async fn update(&self, id: &str, patch: DocumentPatch) -> Result<()> {
        self.base.ensure_ready()?;
        if let Some(embedding) = &patch.embedding {
            self.base.validate_embedding(embedding)?;
        }

        let mut state = self.state.write().await;
        let document = state
            .get_mut(id)
            .ok_or_else(|| RagDbError::NotFound(format!("document {id}")))?;
        document.apply_patch(patch);

        debug!(id = %id, "Updated document");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.base.ensure_ready()?;

        self.state
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RagDbError::NotFound(format!("document {id}")))
    }

    async fn get(&self, id: &str) -> Result<Option<VectorDocument>> {
        self.base.ensure_ready()?;
        Ok(self.state.read().await.get(id).cloned())
    }

    async fn count(&self, filter: Option<&Filter>) -> Result<usize> {
        self.base.ensure_ready()?;

        let state = self.state.read().await;
        Ok(match filter {
            None => state.documents.len(),
            Some(filter) => state.matching(Some(filter)).count(),
        })
    }

    async fn list(&self, options: ListOptions) -> Result<Vec<VectorDocument>> {
        self.base.ensure_ready()?;

        let state = self.state.read().await;
        let matching = state
            .matching(options.filter.as_ref())
            .skip(options.offset);

        Ok(match options.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    async fn grouped_count(&self, key: &str) -> Result<BTreeMap<String, usize>> {
        self.base.ensure_ready()?;

        let state = self.state.read().await;
        let mut groups = BTreeMap::new();
        for doc in state.documents.values() {
            *groups
                .entry(Stats::bucket_for(doc.metadata.get(key)))
                .or_insert(0) += 1;
        }
        Ok(groups)
    }

    /// Writes the snapshot (when configured) before releasing state. A failed
    /// write leaves the adapter ready with its documents, so close can be
    /// retried.
    async fn close(&mut self) -> Result<()> {
        let was_ready = self.base.lifecycle() == Lifecycle::Ready;

        if let (true, Some(path)) = (was_ready, &self.snapshot_path) {
            let documents: Vec<VectorDocument> =
                self.state.get_mut().documents.values().cloned().collect();
            let count = documents.len();
            let snapshot = MemorySnapshot::new(self.base.dimension(), self.metric, documents);
            save_snapshot(&snapshot, path).await?;
            info!(path = %path.display(), count, "Memory vector store saved");
        }

        self.base.mark_closed()?;
        *self.state.get_mut() = MemoryState::default();

        info!("Memory vector store closed");
        Ok(())
    }

    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            provider: PROVIDER.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: Capabilities {
                metadata_filtering: true,
                custom_ids: true,
                native_batch_insert: false,
                native_batch_delete: false,
                grouped_count: true,
                persistent: self.snapshot_path.is_some(),
                delete_missing: DeleteMissing::NotFound,
                metric: self.metric,
            },
        }
    }

    fn dimension(&self) -> usize {
        self.base.dimension()
    }
}
