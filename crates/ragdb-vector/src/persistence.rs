//! Snapshot persistence for the in-memory adapter
//!
//! Documents are serialized to JSON so snapshots stay human-readable and
//! easy to inspect. Writes go to a sibling temp file first and are renamed
//! into place.

use chrono::{DateTime, Utc};
use ragdb_core::{DistanceMetric, RagDbError, VectorDocument};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Snapshot format version written by this build
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

impl From<PersistenceError> for RagDbError {
    fn from(err: PersistenceError) -> Self {
        RagDbError::StorageError(err.to_string())
    }
}

/// Serializable image of a memory store
#[derive(Debug, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub version: u32,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub saved_at: DateTime<Utc>,
    /// Documents in list order
    pub documents: Vec<VectorDocument>,
}

impl MemorySnapshot {
    pub fn new(dimension: usize, metric: DistanceMetric, documents: Vec<VectorDocument>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            dimension,
            metric,
            saved_at: Utc::now(),
            documents,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write a snapshot, creating parent directories as needed
pub async fn save_snapshot(
    snapshot: &MemorySnapshot,
    path: impl AsRef<Path>,
) -> Result<(), PersistenceError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }

    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).await.map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).await.map_err(io_error(path))?;

    Ok(())
}

/// Read a snapshot; `None` when the file does not exist
pub async fn load_snapshot(
    path: impl AsRef<Path>,
) -> Result<Option<MemorySnapshot>, PersistenceError> {
    let path = path.as_ref();

    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path)(e)),
    };

    let snapshot: MemorySnapshot = serde_json::from_slice(&bytes)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(PersistenceError::UnsupportedVersion(snapshot.version));
    }

    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_snapshot(dir.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let docs = vec![VectorDocument::new(vec![0.1, 0.2])
            .with_id("a")
            .with_source_type("web")];

        save_snapshot(&MemorySnapshot::new(2, DistanceMetric::Dot, docs.clone()), &path)
            .await
            .unwrap();
        let loaded = load_snapshot(&path).await.unwrap().unwrap();

        assert_eq!(loaded.dimension, 2);
        assert_eq!(loaded.metric, DistanceMetric::Dot);
        assert_eq!(loaded.documents, docs);
    }

    #[tokio::test]
    async fn test_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut snapshot = MemorySnapshot::new(2, DistanceMetric::Cosine, Vec::new());
        snapshot.version = 99;
        save_snapshot(&snapshot, &path).await.unwrap();

        let err = load_snapshot(&path).await.unwrap_err();
        assert!(matches!(err, PersistenceError::UnsupportedVersion(99)));
    }
}
