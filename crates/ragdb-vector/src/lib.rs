//! ragdb Vector - Vector backend adapters
//!
//! Provides the concrete adapters behind the `VectorDbAdapter` contract
//! (in-memory and Qdrant), the registry that selects one from
//! configuration, and the `DatabaseService` facade callers talk to.

pub mod memory_store;
pub mod persistence;
pub mod qdrant_store;
pub mod registry;
pub mod service;

pub use memory_store::MemoryAdapter;
pub use qdrant_store::QdrantAdapter;
pub use registry::{AdapterFactory, AdapterRegistry};
pub use service::DatabaseService;
