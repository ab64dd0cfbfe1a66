//! Qdrant implementation for vector storage
//!
//! Provides connection management and vector operations for documents
//! stored as Qdrant points.
//!
//! Point layout: the vector is the document embedding; the payload holds
//! `doc_id` (the caller-visible id), `content`, and `metadata`. Qdrant only
//! accepts UUID or integer point ids, so any other document id is mapped to a
//! deterministic UUID v5.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_output::VectorsOptions;
use qdrant_client::qdrant::{
    vectors_config, Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder,
    Distance, Filter as QdrantFilter, GetPointsBuilder, PointId, PointStruct, PointsIdsList,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder, VectorsOutput,
};
use qdrant_client::Qdrant;
use ragdb_core::filter::Condition as MetadataCondition;
use ragdb_core::{
    AdapterBase, AdapterInfo, AdapterOptions, BatchOperation, Capabilities, DeleteMissing,
    DistanceMetric, DocumentPatch, Filter, ListOptions, Metadata, RagDbError, Result,
    SearchOptions, VectorDbAdapter, VectorDocument, VectorSearchResult,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

pub const PROVIDER: &str = "qdrant";

const DEFAULT_URL: &str = "http://localhost:6334";
const DEFAULT_COLLECTION: &str = "ragdb_documents";

/// Points per upsert/delete request
const WRITE_CHUNK: usize = 256;

/// Points per scroll page when listing
const SCROLL_PAGE: u32 = 256;

const DOC_ID_KEY: &str = "doc_id";
const CONTENT_KEY: &str = "content";
const METADATA_KEY: &str = "metadata";

/// Qdrant vector store implementation
pub struct QdrantAdapter {
    base: AdapterBase,
    client: Option<Qdrant>,
    url: String,
    api_key: Option<String>,
    collection: String,
    metric: DistanceMetric,
}

impl QdrantAdapter {
    /// Build the adapter. No connection is made until `initialize`.
    pub fn new(options: &AdapterOptions) -> Result<Self> {
        let metric = options.metric.unwrap_or_default();
        Ok(Self {
            base: AdapterBase::new(PROVIDER, options)?,
            client: None,
            url: options.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
            api_key: options.api_key.clone(),
            collection: options
                .collection
                .clone()
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            metric,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn client(&self) -> Result<&Qdrant> {
        self.base.ensure_ready()?;
        self.client
            .as_ref()
            .ok_or_else(|| RagDbError::ConnectionError("Qdrant client not connected".to_string()))
    }

    fn distance(&self) -> Distance {
        match self.metric {
            DistanceMetric::Cosine => Distance::Cosine,
            DistanceMetric::Dot => Distance::Dot,
            DistanceMetric::Euclidean => Distance::Euclid,
        }
    }

    /// Create the collection when missing; verify its vector size otherwise
    async fn init_collection(&self, client: &Qdrant) -> Result<()> {
        let collections = client
            .list_collections()
            .await
            .map_err(|e| RagDbError::ConnectionError(format!("Failed to list collections: {e}")))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.base.dimension() as u64, self.distance()),
                    ),
                )
                .await
                .map_err(|e| {
                    RagDbError::StorageError(format!("Failed to create collection: {e}"))
                })?;
            info!(collection = %self.collection, "Created Qdrant collection");
            return Ok(());
        }

        let info = client
            .collection_info(&self.collection)
            .await
            .map_err(|e| RagDbError::StorageError(format!("Failed to read collection: {e}")))?;

        let size = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|c| match c {
                vectors_config::Config::Params(params) => Some(params.size),
                _ => None,
            });

        match size {
            Some(size) if size as usize != self.base.dimension() => {
                Err(RagDbError::ConfigurationError(format!(
                    "collection {} stores {size}-dimensional vectors, adapter is configured for {}",
                    self.collection,
                    self.base.dimension()
                )))
            }
            _ => Ok(()),
        }
    }

    async fn upsert(&self, points: Vec<PointStruct>) -> Result<()> {
        self.client()?
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| RagDbError::StorageError(format!("Failed to upsert vectors: {e}")))?;
        Ok(())
    }

    async fn delete_points(&self, ids: Vec<PointId>) -> Result<()> {
        self.client()?
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
            .map_err(|e| RagDbError::StorageError(format!("Failed to delete vectors: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl VectorDbAdapter for QdrantAdapter {
    async fn initialize(&mut self) -> Result<()> {
        self.base.ensure_initializable()?;

        let mut config = Qdrant::from_url(&self.url);
        if let Some(key) = &self.api_key {
            config = config.api_key(key.clone());
        }
        let client = config
            .build()
            .map_err(|e| RagDbError::ConnectionError(format!("Qdrant connection failed: {e}")))?;

        self.init_collection(&client).await?;
        self.client = Some(client);
        self.base.mark_ready();

        info!(
            url = %self.url,
            collection = %self.collection,
            dimension = self.base.dimension(),
            "Qdrant vector store initialized"
        );
        Ok(())
    }

    async fn insert(&self, mut document: VectorDocument) -> Result<String> {
        self.client()?;
        self.base.validate_document(&document)?;

        let id = AdapterBase::assign_id(&mut document);
        self.upsert(vec![to_point(&id, document)]).await?;

        debug!(id = %id, "Inserted document");
        Ok(id)
    }

    /// Validates every document first, then writes in chunked upserts.
    /// Nothing is written when any document is invalid.
    async fn insert_batch(&self, documents: Vec<VectorDocument>) -> Result<Vec<String>> {
        self.client()?;

        for (index, document) in documents.iter().enumerate() {
            if let Err(source) = self.base.validate_document(document) {
                return Err(RagDbError::BatchFailed {
                    operation: BatchOperation::Insert,
                    index,
                    id: document.id.clone(),
                    completed: Vec::new(),
                    source: Box::new(source),
                });
            }
        }

        let mut prepared: Vec<(String, VectorDocument)> = documents
            .into_iter()
            .map(|mut document| (AdapterBase::assign_id(&mut document), document))
            .collect();

        let mut ids = Vec::with_capacity(prepared.len());
        let mut start = 0;
        while !prepared.is_empty() {
            let rest = prepared.split_off(prepared.len().min(WRITE_CHUNK));
            let chunk = std::mem::replace(&mut prepared, rest);
            let chunk_ids: Vec<String> = chunk.iter().map(|(id, _)| id.clone()).collect();
            let points = chunk
                .into_iter()
                .map(|(id, document)| to_point(&id, document))
                .collect();

            if let Err(source) = self.upsert(points).await {
                return Err(RagDbError::BatchFailed {
                    operation: BatchOperation::Insert,
                    index: start,
                    id: chunk_ids.first().cloned(),
                    completed: ids,
                    source: Box::new(source),
                });
            }

            start += chunk_ids.len();
            ids.extend(chunk_ids);
        }

        debug!(count = ids.len(), "Inserted document batch");
        Ok(ids)
    }

    async fn search(
        &self,
        embedding: &[f32],
        options: SearchOptions,
    ) -> Result<Vec<VectorSearchResult>> {
        let client = self.client()?;
        self.base.validate_embedding(embedding)?;

        let k = options.limit();
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut request =
            SearchPointsBuilder::new(&self.collection, embedding.to_vec(), k as u64)
                .with_payload(true)
                .with_vectors(true);
        if let Some(filter) = &options.filter {
            request = request.filter(to_qdrant_filter(filter)?);
        }

        let response = client
            .search_points(request)
            .await
            .map_err(|e| RagDbError::StorageError(format!("Vector search failed: {e}")))?;

        Ok(response
            .result
            .into_iter()
            .enumerate()
            .map(|(rank, point)| VectorSearchResult {
                document: from_point(point.payload, point.vectors, point.id),
                score: point.score,
                rank,
            })
            .collect())
    }

    async fn update(&self, id: &str, patch: DocumentPatch) -> Result<()> {
        self.client()?;
        if let Some(embedding) = &patch.embedding {
            self.base.validate_embedding(embedding)?;
        }

        let mut document = self
            .get(id)
            .await?
            .ok_or_else(|| RagDbError::NotFound(format!("document {id}")))?;
        if patch.is_empty() {
            return Ok(());
        }
        document.apply_patch(patch);

        self.upsert(vec![to_point(id, document)]).await?;
        debug!(id = %id, "Updated document");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.delete_points(vec![point_id(id)]).await
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<()> {
        self.client()?;

        for (start, chunk) in (0..).step_by(WRITE_CHUNK).zip(ids.chunks(WRITE_CHUNK)) {
            let points = chunk.iter().map(|id| point_id(id)).collect();
            if let Err(source) = self.delete_points(points).await {
                return Err(RagDbError::BatchFailed {
                    operation: BatchOperation::Delete,
                    index: start,
                    id: chunk.first().cloned(),
                    completed: ids[..start].to_vec(),
                    source: Box::new(source),
                });
            }
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<VectorDocument>> {
        let response = self
            .client()?
            .get_points(
                GetPointsBuilder::new(&self.collection, vec![point_id(id)])
                    .with_payload(true)
                    .with_vectors(true),
            )
            .await
            .map_err(|e| RagDbError::StorageError(format!("Failed to get vector: {e}")))?;

        Ok(response
            .result
            .into_iter()
            .next()
            .map(|point| from_point(point.payload, point.vectors, point.id)))
    }

    async fn count(&self, filter: Option<&Filter>) -> Result<usize> {
        let mut request = CountPointsBuilder::new(&self.collection).exact(true);
        if let Some(filter) = filter {
            request = request.filter(to_qdrant_filter(filter)?);
        }

        let response = self
            .client()?
            .count(request)
            .await
            .map_err(|e| RagDbError::StorageError(format!("Failed to count vectors: {e}")))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    /// Scrolls in point-id order, skipping `offset` matches client-side
    async fn list(&self, options: ListOptions) -> Result<Vec<VectorDocument>> {
        let client = self.client()?;
        let filter = options.filter.as_ref().map(to_qdrant_filter).transpose()?;

        let mut documents = Vec::new();
        let mut skipped = 0;
        let mut next_offset: Option<PointId> = None;

        loop {
            if options.limit.is_some_and(|limit| documents.len() >= limit) {
                break;
            }

            let mut request = ScrollPointsBuilder::new(&self.collection)
                .limit(SCROLL_PAGE)
                .with_payload(true)
                .with_vectors(true);
            if let Some(filter) = &filter {
                request = request.filter(filter.clone());
            }
            if let Some(offset) = next_offset.take() {
                request = request.offset(offset);
            }

            let response = client
                .scroll(request)
                .await
                .map_err(|e| RagDbError::StorageError(format!("Failed to scroll vectors: {e}")))?;

            for point in response.result {
                if skipped < options.offset {
                    skipped += 1;
                    continue;
                }
                if options.limit.is_some_and(|limit| documents.len() >= limit) {
                    break;
                }
                documents.push(from_point(point.payload, point.vectors, point.id));
            }

            match response.next_page_offset {
                Some(offset) => next_offset = Some(offset),
                None => break,
            }
        }

        Ok(documents)
    }

    async fn close(&mut self) -> Result<()> {
        self.base.mark_closed()?;
        self.client = None;
        info!(collection = %self.collection, "Qdrant vector store closed");
        Ok(())
    }

    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            provider: PROVIDER.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: Capabilities {
                metadata_filtering: true,
                custom_ids: true,
                native_batch_insert: true,
                native_batch_delete: true,
                grouped_count: false,
                persistent: true,
                delete_missing: DeleteMissing::NoOp,
                metric: self.metric,
            },
        }
    }

    fn dimension(&self) -> usize {
        self.base.dimension()
    }
}

// ============================================================================
// Point conversion
// ============================================================================

/// Qdrant point id for a document id.
///
/// Only canonical (lowercase, hyphenated) UUIDs are used as-is. Every other
/// id, including uppercase or braced UUID spellings, maps to UUID v5 so that
/// distinct document ids never share a point.
fn point_id(id: &str) -> PointId {
    let uuid = Uuid::parse_str(id)
        .ok()
        .filter(|uuid| uuid.hyphenated().to_string() == id)
        .unwrap_or_else(|| Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes()));
    PointId::from(uuid.to_string())
}

fn point_id_text(id: Option<PointId>) -> Option<String> {
    match id?.point_id_options? {
        PointIdOptions::Num(n) => Some(n.to_string()),
        PointIdOptions::Uuid(s) => Some(s),
    }
}

fn to_payload(id: &str, document: VectorDocument) -> HashMap<String, QdrantValue> {
    let metadata: serde_json::Map<String, JsonValue> = document.metadata.into_iter().collect();

    let mut payload = HashMap::new();
    payload.insert(DOC_ID_KEY.to_string(), JsonValue::from(id).into());
    if let Some(content) = document.content {
        payload.insert(CONTENT_KEY.to_string(), JsonValue::from(content).into());
    }
    payload.insert(METADATA_KEY.to_string(), JsonValue::Object(metadata).into());
    payload
}

fn to_point(id: &str, document: VectorDocument) -> PointStruct {
    let embedding = document.embedding.clone();
    PointStruct::new(point_id(id), embedding, to_payload(id, document))
}

fn from_point(
    mut payload: HashMap<String, QdrantValue>,
    vectors: Option<VectorsOutput>,
    point: Option<PointId>,
) -> VectorDocument {
    let id = payload
        .remove(DOC_ID_KEY)
        .and_then(|v| match to_json(v) {
            JsonValue::String(s) => Some(s),
            _ => None,
        })
        .or_else(|| point_id_text(point));

    let content = payload.remove(CONTENT_KEY).and_then(|v| match to_json(v) {
        JsonValue::String(s) => Some(s),
        _ => None,
    });

    let metadata: Metadata = match payload.remove(METADATA_KEY).map(to_json) {
        Some(JsonValue::Object(map)) => map.into_iter().collect(),
        _ => Metadata::new(),
    };

    let embedding = match vectors.and_then(|v| v.vectors_options) {
        Some(VectorsOptions::Vector(vector)) => vector.data,
        _ => Vec::new(),
    };

    VectorDocument {
        id,
        embedding,
        content,
        metadata,
    }
}

fn to_json(value: QdrantValue) -> JsonValue {
    match value.kind {
        None | Some(Kind::NullValue(_)) => JsonValue::Null,
        Some(Kind::BoolValue(b)) => JsonValue::Bool(b),
        Some(Kind::IntegerValue(i)) => JsonValue::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Some(Kind::StringValue(s)) => JsonValue::String(s),
        Some(Kind::ListValue(list)) => {
            JsonValue::Array(list.values.into_iter().map(to_json).collect())
        }
        Some(Kind::StructValue(object)) => JsonValue::Object(
            object
                .fields
                .into_iter()
                .map(|(k, v)| (k, to_json(v)))
                .collect(),
        ),
    }
}

// ============================================================================
// Filter translation
// ============================================================================

fn payload_key(key: &str) -> String {
    format!("{METADATA_KEY}.{key}")
}

fn to_qdrant_filter(filter: &Filter) -> Result<QdrantFilter> {
    let mut out = QdrantFilter::default();

    for condition in &filter.must {
        match condition {
            MetadataCondition::Exists { key } => {
                out.must_not.push(Condition::is_empty(payload_key(key)))
            }
            other => out.must.push(to_condition(other)?),
        }
    }
    for condition in &filter.must_not {
        match condition {
            MetadataCondition::Exists { key } => {
                out.must.push(Condition::is_empty(payload_key(key)))
            }
            other => out.must_not.push(to_condition(other)?),
        }
    }

    Ok(out)
}

fn unsupported(key: &str, value: &JsonValue) -> RagDbError {
    RagDbError::ValidationError(format!(
        "Qdrant filters match strings, integers, and booleans; got {value} for {key}"
    ))
}

fn to_condition(condition: &MetadataCondition) -> Result<Condition> {
    match condition {
        MetadataCondition::Equals { key, value } => {
            let field = payload_key(key);
            match value {
                JsonValue::String(s) => Ok(Condition::matches(field, s.clone())),
                JsonValue::Bool(b) => Ok(Condition::matches(field, *b)),
                JsonValue::Number(n) => n
                    .as_i64()
                    .map(|i| Condition::matches(field, i))
                    .ok_or_else(|| unsupported(key, value)),
                other => Err(unsupported(key, other)),
            }
        }
        MetadataCondition::AnyOf { key, values } => {
            let field = payload_key(key);
            if let Some(strings) = values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
            {
                return Ok(Condition::matches(field, strings));
            }
            if let Some(ints) = values.iter().map(JsonValue::as_i64).collect::<Option<Vec<_>>>() {
                return Ok(Condition::matches(field, ints));
            }
            Err(unsupported(key, &JsonValue::Array(values.clone())))
        }
        MetadataCondition::Exists { key } => Ok(Condition::is_empty(payload_key(key))),
    }
}
