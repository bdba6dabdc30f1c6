use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use super::client::{VectorStore, ensure_tenant};
use super::error::{VectorStoreError, VectorStoreResult};
use super::model::{
    AGENTS_SCROLL_LIMIT, AgentsOperation, EmbeddingMetadata, SearchHit, SearchParams,
    UpsertOutcome, agents_from_payload, apply_agents_operation, chunk_payload,
};
use crate::parser::Chunk;

#[derive(Clone)]
struct MockPoint {
    vector: Vec<f32>,
    payload: Value,
}

/// In-memory [`VectorStore`] with real filter evaluation.
#[derive(Default)]
pub struct MockVectorIndex {
    points: RwLock<HashMap<String, MockPoint>>,
}

impl MockVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total points stored.
    pub fn point_count(&self) -> usize {
        self.points.read().len()
    }

    /// Payload of one point, for assertions.
    pub fn payload_of(&self, chunk_id: Uuid) -> Option<Value> {
        self.points
            .read()
            .get(&chunk_id.to_string())
            .map(|p| p.payload.clone())
    }

    /// Points whose payload matches every `(field, value)` pair, where a
    /// list field matches when it contains the value.
    pub fn points_matching(&self, filters: &[(&str, &str)]) -> usize {
        self.points
            .read()
            .values()
            .filter(|p| filters.iter().all(|(f, v)| payload_field_matches(&p.payload, f, v)))
            .count()
    }
}

fn payload_field_matches(payload: &Value, field: &str, expected: &str) -> bool {
    match payload.get(field) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Array(items)) => items.iter().any(|i| i.as_str() == Some(expected)),
        Some(other) => other.to_string() == expected,
        None => false,
    }
}

impl VectorStore for MockVectorIndex {
    async fn ensure_ready(&self) -> VectorStoreResult<()> {
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

        let mut points = self.points.write();
        let mut outcome = UpsertOutcome::default();

        for chunk in chunks {
            let Some(embedding) = chunk.embedding.clone() else {
                outcome.failed += 1;
                outcome.failed_ids.push(chunk.chunk_id);
                continue;
            };

            points.insert(
                chunk.chunk_id.to_string(),
                MockPoint {
                    vector: embedding,
                    payload: chunk_payload(chunk, tenant_id, collection_id, agent_ids, metadata),
                },
            );
            outcome.stored += 1;
        }

        Ok(outcome)
    }

    async fn delete_document(
        &self,
        tenant_id: Uuid,
        collection_id: &str,
        document_id: Uuid,
    ) -> VectorStoreResult<()> {
        ensure_tenant(tenant_id)?;

        let tenant = tenant_id.to_string();
        let document = document_id.to_string();
        self.points.write().retain(|_, p| {
            !(payload_field_matches(&p.payload, "tenant_id", &tenant)
                && payload_field_matches(&p.payload, "collection_id", collection_id)
                && payload_field_matches(&p.payload, "document_id", &document))
        });
        Ok(())
    }

    async fn search(&self, params: SearchParams) -> VectorStoreResult<Vec<SearchHit>> {
        ensure_tenant(params.tenant_id)?;
        if params.agent_id.is_nil() {
            return Err(VectorStoreError::MissingTenant);
        }

        let tenant = params.tenant_id.to_string();
        let agent = params.agent_id.to_string();

        let mut hits: Vec<SearchHit> = self
            .points
            .read()
            .iter()
            .filter(|(_, p)| {
                payload_field_matches(&p.payload, "tenant_id", &tenant)
                    && payload_field_matches(&p.payload, "agent_ids", &agent)
                    && params.collection_ids.as_ref().is_none_or(|ids| {
                        ids.iter()
                            .any(|c| payload_field_matches(&p.payload, "collection_id", c))
                    })
                    && params.document_ids.as_ref().is_none_or(|ids| {
                        ids.iter()
                            .any(|d| payload_field_matches(&p.payload, "document_id", d))
                    })
            })
            .map(|(id, p)| SearchHit {
                id: id.clone(),
                score: cosine_similarity(&params.query_vector, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|hit| hit.score >= params.threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(params.top_k as usize);
        Ok(hits)
    }

    async fn update_chunk_agents(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
        agent_ids: &[String],
        operation: AgentsOperation,
    ) -> VectorStoreResult<u64> {
        ensure_tenant(tenant_id)?;

        let tenant = tenant_id.to_string();
        let document = document_id.to_string();

        let mut points = self.points.write();
        let mut updated = 0;
        for point in points.values_mut() {
            if updated as u32 >= AGENTS_SCROLL_LIMIT {
                break;
            }
            if payload_field_matches(&point.payload, "tenant_id", &tenant)
                && payload_field_matches(&point.payload, "document_id", &document)
            {
                let current = agents_from_payload(&point.payload);
                let next = apply_agents_operation(current, agent_ids, operation);
                if let Some(map) = point.payload.as_object_mut() {
                    map.insert("agent_ids".to_string(), serde_json::json!(next));
                }
                updated += 1;
            }
        }
        Ok(updated)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
