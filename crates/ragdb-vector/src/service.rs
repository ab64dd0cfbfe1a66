//! Database service facade
//!
//! Owns exactly one adapter per session, manages its lifecycle, and layers
//! listing and statistics on top of the adapter contract.
//!
//! Author: hephaex@gmail.com

use futures::future::BoxFuture;
use ragdb_core::{
    metadata_keys, AdapterInfo, DocumentPatch, Filter, ListOptions, RagDbError, Result,
    SearchOptions, Stats, VectorDbAdapter, VectorDbConfig, VectorDocument, VectorSearchResult,
};
use tracing::{debug, info, warn};

use crate::AdapterRegistry;

/// Facade over a single vector adapter
pub struct DatabaseService {
    registry: AdapterRegistry,
    adapter: Option<Box<dyn VectorDbAdapter>>,
    closed: bool,
}

impl DatabaseService {
    /// Service using the built-in providers
    pub fn new() -> Self {
        Self::with_registry(AdapterRegistry::with_defaults())
    }

    /// Service resolving providers through `registry`
    pub fn with_registry(registry: AdapterRegistry) -> Self {
        Self {
            registry,
            adapter: None,
            closed: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.adapter.is_some()
    }

    /// Select the adapter for `config.provider`, construct it, and initialize it
    pub async fn initialize(&mut self, config: &VectorDbConfig) -> Result<()> {
        self.ensure_uninitialized()?;
        let adapter = self.registry.create(config)?;
        self.initialize_with(adapter).await
    }

    /// Take ownership of a caller-built adapter and initialize it.
    ///
    /// When initialization fails the adapter is closed before the error is
    /// returned.
    pub async fn initialize_with(&mut self, mut adapter: Box<dyn VectorDbAdapter>) -> Result<()> {
        self.ensure_uninitialized()?;

        if let Err(err) = adapter.initialize().await {
            if let Err(close_err) = adapter.close().await {
                warn!(error = %close_err, "Failed to close adapter after initialization error");
            }
            return Err(err);
        }

        let info = adapter.info();
        info!(
            provider = %info.provider,
            version = %info.version,
            dimension = adapter.dimension(),
            "Database service initialized"
        );

        self.adapter = Some(adapter);
        self.closed = false;
        Ok(())
    }

    fn ensure_uninitialized(&self) -> Result<()> {
        if self.adapter.is_some() {
            return Err(RagDbError::ConfigurationError(
                "database service is already initialized".to_string(),
            ));
        }
        Ok(())
    }

    /// The active adapter
    pub fn adapter(&self) -> Result<&dyn VectorDbAdapter> {
        match &self.adapter {
            Some(adapter) => Ok(adapter.as_ref()),
            None if self.closed => Err(RagDbError::Closed),
            None => Err(RagDbError::ConnectionError(
                "database service has not been initialized".to_string(),
            )),
        }
    }

    pub fn info(&self) -> Result<AdapterInfo> {
        Ok(self.adapter()?.info())
    }

    pub async fn insert(&self, document: VectorDocument) -> Result<String> {
        self.adapter()?.insert(document).await
    }

    pub async fn insert_batch(&self, documents: Vec<VectorDocument>) -> Result<Vec<String>> {
        self.adapter()?.insert_batch(documents).await
    }

    pub async fn search(
        &self,
        embedding: &[f32],
        options: SearchOptions,
    ) -> Result<Vec<VectorSearchResult>> {
        self.adapter()?.search(embedding, options).await
    }

    pub async fn update(&self, id: &str, patch: DocumentPatch) -> Result<()> {
        self.adapter()?.update(id, patch).await
    }

    /// Delete by id. Unknown ids follow `capabilities.delete_missing`.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.adapter()?.delete(id).await
    }

    pub async fn delete_batch(&self, ids: &[String]) -> Result<()> {
        self.adapter()?.delete_batch(ids).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<VectorDocument>> {
        self.adapter()?.get(id).await
    }

    pub async fn count(&self, filter: Option<&Filter>) -> Result<usize> {
        self.adapter()?.count(filter).await
    }

    /// Page through stored documents in the adapter's stable order
    pub async fn list_items(&self, options: ListOptions) -> Result<Vec<VectorDocument>> {
        self.adapter()?.list(options).await
    }

    /// Total count plus per-`sourceType` counts.
    ///
    /// Uses the backend's grouped count when advertised, otherwise scans
    /// every stored document.
    pub async fn get_stats(&self) -> Result<Stats> {
        let adapter = self.adapter()?;

        let mut stats = Stats {
            total_items: adapter.count(None).await?,
            ..Default::default()
        };
        if stats.total_items == 0 {
            return Ok(stats);
        }

        if adapter.info().capabilities.grouped_count {
            stats.by_source_type = adapter.grouped_count(metadata_keys::SOURCE_TYPE).await?;
        } else {
            debug!("Computing stats with a full scan");
            for document in adapter.list(ListOptions::new()).await? {
                stats.record(&document);
            }
        }

        Ok(stats)
    }

    /// Close the adapter. Later calls are no-ops.
    ///
    /// When the adapter fails to close it stays attached, so the call can be
    /// retried.
    pub async fn close(&mut self) -> Result<()> {
        let Some(adapter) = self.adapter.as_mut() else {
            return Ok(());
        };

        match adapter.close().await {
            Ok(()) | Err(RagDbError::Closed) => {}
            Err(err) => return Err(err),
        }
        self.adapter = None;
        self.closed = true;
        info!("Database service closed");
        Ok(())
    }

    /// Initialize from `config`, run `f`, and close on every exit path.
    ///
    /// ```rust,ignore
    /// let stats = DatabaseService::with_session(&config, |db| {
    ///     Box::pin(async move { db.get_stats().await })
    /// })
    /// .await?;
    /// ```
    pub async fn with_session<T, F>(config: &VectorDbConfig, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a DatabaseService) -> BoxFuture<'a, Result<T>>,
    {
        Self::new().run(config, f).await
    }

    /// Like [`with_session`](Self::with_session), resolving through this
    /// service's registry.
    pub async fn run<T, F>(mut self, config: &VectorDbConfig, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a DatabaseService) -> BoxFuture<'a, Result<T>>,
    {
        self.initialize(config).await?;

        let outcome = f(&self).await;
        let closed = self.close().await;

        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                warn!(error = %close_err, "Failed to close adapter after operation error");
                Err(err)
            }
        }
    }
}

impl Default for DatabaseService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DatabaseService {
    fn drop(&mut self) {
        if let Some(adapter) = &self.adapter {
            warn!(
                provider = %adapter.info().provider,
                "DatabaseService dropped without close()"
            );
        }
    }
}
