//! Qdrant-backed vector index.

use std::collections::HashMap;
use std::sync::Arc;

use qdrant_client::Payload;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, PointId, PointStruct, PointsIdsList, ScrollPointsBuilder,
    SearchPointsBuilder, SetPayloadPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{VectorStoreError, VectorStoreResult};
use super::model::{
    AGENTS_SCROLL_LIMIT, AgentsOperation, COLLECTION_NAME, EmbeddingMetadata,
    PAYLOAD_INDEX_FIELDS, SearchHit, SearchParams, UpsertOutcome, agents_from_payload,
    apply_agents_operation, chunk_payload,
};
use crate::parser::Chunk;

/// Hierarchy-filtered operations on the shared physical collection.
///
/// Every implementation must refuse calls without a tenant: the
/// collection is shared and `tenant_id` is the outermost isolation key.
pub trait VectorStore: Send + Sync {
    /// Creates the collection and its payload indices when missing.
    fn ensure_ready(&self) -> impl std::future::Future<Output = VectorStoreResult<()>> + Send;

    /// Upserts chunk points under the full hierarchy. Chunks lacking an
    /// embedding are rejected and counted in the outcome.
    fn upsert_chunks(
        &self,
        chunks: &[Chunk],
        tenant_id: Uuid,
        collection_id: &str,
        agent_ids: &[String],
        metadata: &EmbeddingMetadata,
    ) -> impl std::future::Future<Output = VectorStoreResult<UpsertOutcome>> + Send;

    /// Deletes every chunk of a document. All three hierarchy keys are
    /// required.
    fn delete_document(
        &self,
        tenant_id: Uuid,
        collection_id: &str,
        document_id: Uuid,
    ) -> impl std::future::Future<Output = VectorStoreResult<()>> + Send;

    /// Searches points visible to an agent, score descending.
    fn search(
        &self,
        params: SearchParams,
    ) -> impl std::future::Future<Output = VectorStoreResult<Vec<SearchHit>>> + Send;

    /// Recomputes `agent_ids` on every chunk of a document. Returns how
    /// many points were updated.
    fn update_chunk_agents(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
        agent_ids: &[String],
        operation: AgentsOperation,
    ) -> impl std::future::Future<Output = VectorStoreResult<u64>> + Send;
}

pub(crate) fn ensure_tenant(tenant_id: Uuid) -> VectorStoreResult<()> {
    if tenant_id.is_nil() {
        return Err(VectorStoreError::MissingTenant);
    }
    Ok(())
}

#[derive(Clone)]
/// [`VectorStore`] over a Qdrant endpoint.
pub struct QdrantIndex {
    client: Arc<Qdrant>,
    collection: String,
    vector_size: u64,
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("collection", &self.collection)
            .field("vector_size", &self.vector_size)
            .finish_non_exhaustive()
    }
}

impl QdrantIndex {
    /// Connects to `url`, optionally authenticating with an API key.
    pub async fn new(
        url: &str,
        api_key: Option<&str>,
        vector_size: u64,
    ) -> VectorStoreResult<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client: Arc::new(client),
            collection: COLLECTION_NAME.to_string(),
            vector_size,
        })
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn document_filter(tenant_id: Uuid, document_id: Uuid) -> Filter {
        Filter::must([
            Condition::matches("tenant_id", tenant_id.to_string()),
            Condition::matches("document_id", document_id.to_string()),
        ])
    }
}

impl VectorStore for QdrantIndex {
    async fn ensure_ready(&self) -> VectorStoreResult<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorStoreError::CollectionFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection)
                        .vectors_config(VectorParamsBuilder::new(self.vector_size, Distance::Cosine))
                        .on_disk_payload(true),
                )
                .await
                .map_err(|e| VectorStoreError::CollectionFailed {
                    collection: self.collection.clone(),
                    message: e.to_string(),
                })?;
        }

        for field in PAYLOAD_INDEX_FIELDS {
            let result = self
                .client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    *field,
                    FieldType::Keyword,
                ))
                .await;
            if let Err(e) = result {
                // The index usually exists already after first startup.
                debug!(field, error = %e, "payload index creation skipped");
            }
        }

        info!(collection = %self.collection, "vector collection ready");
        Ok(())
    }

    async fn upsert_chunks(
        &self,
        chunks: &[Chunk],
        tenant_id: Uuid,
        collection_id: &str,
        agent_ids: &[String],
        metadata: &EmbeddingMetadata,
    ) -> VectorStoreResult<UpsertOutcome> {
        ensure_tenant(tenant_id)?;

        if chunks.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        let mut points = Vec::with_capacity(chunks.len());
        let mut attempted_ids = Vec::with_capacity(chunks.len());
        let mut failed_ids = Vec::new();

        for chunk in chunks {
            let Some(embedding) = chunk.embedding.clone() else {
                warn!(chunk_id = %chunk.chunk_id, "chunk has no embedding, skipping");
                failed_ids.push(chunk.chunk_id);
                continue;
            };

            let payload = chunk_payload(chunk, tenant_id, collection_id, agent_ids, metadata);
            let payload =
                Payload::try_from(payload).map_err(|e| VectorStoreError::InvalidPayload {
                    message: e.to_string(),
                })?;

            attempted_ids.push(chunk.chunk_id);
            points.push(PointStruct::new(
                chunk.chunk_id.to_string(),
                embedding,
                payload,
            ));
        }

        if !points.is_empty() {
            let upsert = self
                .client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
                .await;

            if let Err(e) = upsert {
                failed_ids.extend(attempted_ids.iter().copied());
                attempted_ids.clear();
                warn!(
                    collection = %self.collection,
                    tenant_id = %tenant_id,
                    error = %e,
                    "chunk upsert failed"
                );
            }
        }

        let outcome = UpsertOutcome {
            stored: attempted_ids.len(),
            failed: failed_ids.len(),
            failed_ids,
        };
        info!(
            tenant_id = %tenant_id,
            collection_id,
            stored = outcome.stored,
            failed = outcome.failed,
            "chunks stored"
        );
        Ok(outcome)
    }

    async fn delete_document(
        &self,
        tenant_id: Uuid,
        collection_id: &str,
        document_id: Uuid,
    ) -> VectorStoreResult<()> {
        ensure_tenant(tenant_id)?;

        // All three keys: a wrong collection_id must not reach another
        // collection's points under the same tenant.
        let filter = Filter::must([
            Condition::matches("tenant_id", tenant_id.to_string()),
            Condition::matches("collection_id", collection_id.to_string()),
            Condition::matches("document_id", document_id.to_string()),
        ]);

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(|e| VectorStoreError::DeleteFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        info!(
            tenant_id = %tenant_id,
            collection_id,
            document_id = %document_id,
            "document deleted from vector index"
        );
        Ok(())
    }

    async fn search(&self, params: SearchParams) -> VectorStoreResult<Vec<SearchHit>> {
        ensure_tenant(params.tenant_id)?;
        if params.agent_id.is_nil() {
            return Err(VectorStoreError::MissingTenant);
        }

        let mut must = vec![
            Condition::matches("tenant_id", params.tenant_id.to_string()),
            Condition::matches("agent_ids", params.agent_id.to_string()),
        ];
        if let Some(collection_ids) = &params.collection_ids {
            must.push(Condition::matches("collection_id", collection_ids.clone()));
        }
        if let Some(document_ids) = &params.document_ids {
            must.push(Condition::matches("document_id", document_ids.clone()));
        }

        let search =
            SearchPointsBuilder::new(&self.collection, params.query_vector.clone(), params.top_k)
                .filter(Filter::must(must))
                .score_threshold(params.threshold)
                .with_payload(true);

        let response = self
            .client
            .search_points(search)
            .await
            .map_err(|e| VectorStoreError::SearchFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = point_id_string(point.id.clone())?;
                Some(SearchHit {
                    id,
                    score: point.score,
                    payload: payload_to_json(point.payload),
                })
            })
            .collect())
    }

    async fn update_chunk_agents(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
        agent_ids: &[String],
        operation: AgentsOperation,
    ) -> VectorStoreResult<u64> {
        ensure_tenant(tenant_id)?;

        let scroll = ScrollPointsBuilder::new(&self.collection)
            .filter(Self::document_filter(tenant_id, document_id))
            .limit(AGENTS_SCROLL_LIMIT)
            .with_payload(true);

        let response = self
            .client
            .scroll(scroll)
            .await
            .map_err(|e| VectorStoreError::ScrollFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        if response.result.len() as u32 == AGENTS_SCROLL_LIMIT {
            warn!(
                document_id = %document_id,
                limit = AGENTS_SCROLL_LIMIT,
                "agents update scroll page is full, document may be truncated"
            );
        }

        let mut updated = 0;
        for point in response.result {
            let Some(point_id) = point.id.clone() else {
                continue;
            };
            let current = agents_from_payload(&payload_to_json(point.payload));
            let next = apply_agents_operation(current, agent_ids, operation);

            let payload = Payload::try_from(serde_json::json!({"agent_ids": next})).map_err(
                |e| VectorStoreError::InvalidPayload {
                    message: e.to_string(),
                },
            )?;

            self.client
                .set_payload(
                    SetPayloadPointsBuilder::new(&self.collection, payload)
                        .points_selector(PointsIdsList {
                            ids: vec![point_id],
                        })
                        .wait(true),
                )
                .await
                .map_err(|e| VectorStoreError::SetPayloadFailed {
                    collection: self.collection.clone(),
                    message: e.to_string(),
                })?;
            updated += 1;
        }

        info!(
            tenant_id = %tenant_id,
            document_id = %document_id,
            operation = operation.as_str(),
            updated,
            "chunk agent access updated"
        );
        Ok(updated)
    }
}

fn point_id_string(id: Option<PointId>) -> Option<String> {
    match id?.point_id_options? {
        PointIdOptions::Uuid(uuid) => Some(uuid),
        PointIdOptions::Num(n) => Some(n.to_string()),
    }
}

fn payload_to_json(payload: HashMap<String, qdrant_client::qdrant::Value>) -> Value {
    Value::Object(
        payload
            .into_iter()
            .map(|(k, v)| (k, qdrant_value_to_json(v)))
            .collect(),
    )
}

fn qdrant_value_to_json(value: qdrant_client::qdrant::Value) -> Value {
    match value.kind {
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(fields)) => Value::Object(
            fields
                .fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}
