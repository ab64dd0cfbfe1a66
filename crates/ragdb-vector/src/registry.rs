//! Adapter registry
//!
//! Maps provider names from configuration to adapter constructors.
//! Lookup is case-insensitive.

use ragdb_core::{AdapterOptions, RagDbError, Result, VectorDbAdapter, VectorDbConfig};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::{memory_store, qdrant_store, MemoryAdapter, QdrantAdapter};

/// Constructor for a boxed adapter
pub type AdapterFactory =
    Box<dyn Fn(&AdapterOptions) -> Result<Box<dyn VectorDbAdapter>> + Send + Sync>;

/// Provider name → adapter constructor
pub struct AdapterRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    /// Registry with no providers
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in `memory` and `qdrant` providers
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(memory_store::PROVIDER, |options| {
            Ok(Box::new(MemoryAdapter::new(options)?) as Box<dyn VectorDbAdapter>)
        });
        registry.register(qdrant_store::PROVIDER, |options| {
            Ok(Box::new(QdrantAdapter::new(options)?) as Box<dyn VectorDbAdapter>)
        });
        registry
    }

    /// Add or replace a provider
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&AdapterOptions) -> Result<Box<dyn VectorDbAdapter>> + Send + Sync + 'static,
    {
        self.factories
            .insert(name.into().to_lowercase(), Box::new(factory));
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct (but do not initialize) the adapter named by `config.provider`
    pub fn create(&self, config: &VectorDbConfig) -> Result<Box<dyn VectorDbAdapter>> {
        let name = config.provider.trim().to_lowercase();
        let factory = self.factories.get(&name).ok_or_else(|| {
            RagDbError::ConfigurationError(format!(
                "unknown vector database provider '{}' (available: {})",
                config.provider,
                self.providers().collect::<Vec<_>>().join(", ")
            ))
        })?;

        debug!(provider = %name, "Creating vector adapter");
        factory(&config.options)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("providers", &self.providers().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdb_core::ErrorKind;

    #[test]
    fn test_default_providers() {
        let registry = AdapterRegistry::with_defaults();
        assert_eq!(registry.providers().collect::<Vec<_>>(), vec!["memory", "qdrant"]);
    }

    #[test]
    fn test_create_is_case_insensitive() {
        let registry = AdapterRegistry::with_defaults();
        let adapter = registry
            .create(&VectorDbConfig::new(" MEMORY ").with_dimension(4))
            .unwrap();
        assert_eq!(adapter.info().provider, "memory");
        assert_eq!(adapter.dimension(), 4);
    }

    #[test]
    fn test_unknown_provider() {
        let registry = AdapterRegistry::with_defaults();
        let err = registry
            .create(&VectorDbConfig::new("pinecone"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("pinecone"));
    }

    #[test]
    fn test_invalid_options_surface_at_create() {
        let registry = AdapterRegistry::with_defaults();
        let err = registry
            .create(&VectorDbConfig::new("memory").with_dimension(0))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
