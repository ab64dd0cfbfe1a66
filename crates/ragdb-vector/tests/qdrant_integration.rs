//! Qdrant adapter integration tests
//!
//! Note: These tests require a running Qdrant instance.
//! Start one (e.g. `docker run -p 6334:6334 qdrant/qdrant`) and run:
//! cargo test -p ragdb-vector --test qdrant_integration -- --ignored
//!
//! Author: hephaex@gmail.com

use ragdb_core::{
    DeleteMissing, DocumentPatch, ErrorKind, Filter, ListOptions, RagDbError, SearchOptions,
    VectorDbConfig, VectorDocument,
};
use ragdb_vector::DatabaseService;

const DIM: usize = 4;

fn qdrant_config() -> VectorDbConfig {
    let mut config = VectorDbConfig::new("qdrant").with_dimension(DIM);
    config.options.url =
        Some(std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".to_string()));
    config.options.collection = Some(format!("ragdb_test_{}", uuid::Uuid::new_v4().simple()));
    config
}

fn doc(values: [f32; DIM]) -> VectorDocument {
    VectorDocument::new(values.to_vec())
}

#[tokio::test]
#[ignore]
async fn test_qdrant_crud_round_trip() {
    let mut service = DatabaseService::new();
    service.initialize(&qdrant_config()).await.unwrap();

    let input = doc([0.1, 0.2, 0.3, 0.4])
        .with_id("chunk-1")
        .with_content("hello qdrant")
        .with_source_type("web");
    let id = service.insert(input.clone()).await.unwrap();
    assert_eq!(id, "chunk-1");

    let stored = service.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.id, input.id);
    assert_eq!(stored.content, input.content);
    assert_eq!(stored.metadata, input.metadata);
    assert_eq!(stored.embedding.len(), DIM);

    service
        .update(&id, DocumentPatch::new().with_content("updated"))
        .await
        .unwrap();
    let updated = service.get(&id).await.unwrap().unwrap();
    assert_eq!(updated.content.as_deref(), Some("updated"));

    service.update(&id, DocumentPatch::new()).await.unwrap();
    let err = service
        .update("absent", DocumentPatch::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let info = service.info().unwrap();
    assert_eq!(info.capabilities.delete_missing, DeleteMissing::NoOp);
    service.delete(&id).await.unwrap();
    service.delete(&id).await.unwrap();
    assert!(service.get(&id).await.unwrap().is_none());

    service.close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_qdrant_batch_search_and_stats() {
    let mut service = DatabaseService::new();
    service.initialize(&qdrant_config()).await.unwrap();

    let ids = service
        .insert_batch(vec![
            doc([1.0, 0.0, 0.0, 0.0]).with_source_type("web"),
            doc([0.9, 0.1, 0.0, 0.0]).with_source_type("web"),
            doc([0.0, 1.0, 0.0, 0.0]).with_source_type("pdf"),
        ])
        .await
        .unwrap();
    assert_eq!(ids.len(), 3);

    let results = service
        .search(&[1.0, 0.0, 0.0, 0.0], SearchOptions::new().with_k(2))
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].score >= results[1].score);
    assert_eq!(results[0].document.id.as_deref(), Some(ids[0].as_str()));

    let pdf = Filter::eq("sourceType", "pdf");
    assert_eq!(service.count(Some(&pdf)).await.unwrap(), 1);

    let stats = service.get_stats().await.unwrap();
    assert_eq!(stats.total_items, 3);
    assert_eq!(stats.by_source_type["web"], 2);
    assert_eq!(stats.by_source_type["pdf"], 1);

    let first = service
        .list_items(ListOptions::new().with_limit(2))
        .await
        .unwrap();
    let second = service
        .list_items(ListOptions::new().with_limit(2))
        .await
        .unwrap();
    assert_eq!(first, second);

    service.delete_batch(&ids).await.unwrap();
    assert_eq!(service.count(None).await.unwrap(), 0);

    service.close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_qdrant_native_batch_is_all_or_nothing() {
    let mut service = DatabaseService::new();
    service.initialize(&qdrant_config()).await.unwrap();

    let err = service
        .insert_batch(vec![
            doc([1.0, 0.0, 0.0, 0.0]).with_id("ok"),
            VectorDocument::new(vec![1.0]).with_id("bad"),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, RagDbError::BatchFailed { index: 1, .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(service.get("ok").await.unwrap().is_none());

    service.close().await.unwrap();
}
