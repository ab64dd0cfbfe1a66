//! Property tests for the adapter contract (in-memory backend)

use proptest::prelude::*;
use ragdb_core::{
    DistanceMetric, ListOptions, SearchOptions, VectorDbAdapter, VectorDbConfig, VectorDocument,
};
use ragdb_vector::AdapterRegistry;

const DIM: usize = 4;

fn embedding() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-10.0f32..10.0, DIM)
}

fn source_type() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(vec!["web", "pdf", "notes"]).prop_map(String::from))
}

fn documents() -> impl Strategy<Value = Vec<VectorDocument>> {
    prop::collection::vec((embedding(), source_type(), ".{0,20}"), 0..25).prop_map(|items| {
        items
            .into_iter()
            .map(|(embedding, source, content)| {
                let doc = VectorDocument::new(embedding).with_content(content);
                match source {
                    Some(source) => doc.with_source_type(source),
                    None => doc,
                }
            })
            .collect()
    })
}

fn metric() -> impl Strategy<Value = DistanceMetric> {
    prop_oneof![
        Just(DistanceMetric::Cosine),
        Just(DistanceMetric::Dot),
        Just(DistanceMetric::Euclidean),
    ]
}

async fn adapter(metric: DistanceMetric) -> Box<dyn VectorDbAdapter> {
    let config = VectorDbConfig::new("memory")
        .with_dimension(DIM)
        .with_metric(metric);
    let mut adapter = AdapterRegistry::with_defaults().create(&config).unwrap();
    adapter.initialize().await.unwrap();
    adapter
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn prop_search_is_ordered_and_bounded(
        docs in documents(),
        query in embedding(),
        k in 0usize..30,
        metric in metric(),
    ) {
        runtime().block_on(async {
            let adapter = adapter(metric).await;
            adapter.insert_batch(docs.clone()).await.unwrap();

            let results = adapter
                .search(&query, SearchOptions::new().with_k(k))
                .await
                .unwrap();

            prop_assert!(results.len() <= k);
            prop_assert_eq!(results.len(), k.min(docs.len()));
            for pair in results.windows(2) {
                if metric.higher_is_better() {
                    prop_assert!(pair[0].score >= pair[1].score);
                } else {
                    prop_assert!(pair[0].score <= pair[1].score);
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_insert_get_round_trip(docs in documents()) {
        runtime().block_on(async {
            let adapter = adapter(DistanceMetric::Cosine).await;
            let ids = adapter.insert_batch(docs.clone()).await.unwrap();
            prop_assert_eq!(ids.len(), docs.len());

            for (id, original) in ids.iter().zip(docs) {
                let stored = adapter.get(id).await.unwrap();
                prop_assert_eq!(stored, Some(original.with_id(id.clone())));
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_count_equals_list_length(docs in documents(), deletes in 0usize..10) {
        runtime().block_on(async {
            let adapter = adapter(DistanceMetric::Cosine).await;
            let ids = adapter.insert_batch(docs).await.unwrap();
            let removed: Vec<String> = ids.iter().take(deletes).cloned().collect();
            adapter.delete_batch(&removed).await.unwrap();

            let total = adapter.count(None).await.unwrap();
            let listed = adapter
                .list(ListOptions::new().with_limit(total))
                .await
                .unwrap();

            prop_assert_eq!(total, ids.len() - removed.len());
            prop_assert_eq!(total, listed.len());
            for id in &removed {
                prop_assert!(adapter.get(id).await.unwrap().is_none());
            }
            Ok(())
        })?;
    }
}
