//! Point payload schema and operation types.
//!
//! One physical collection serves every tenant. Isolation is achieved by
//! the payload hierarchy `tenant_id → collection_id → agent_ids →
//! document_id → chunk_id`, applied as filter conditions on every read
//! and write.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::parser::Chunk;

/// The single physical collection.
pub const COLLECTION_NAME: &str = "nooble8_vectors";
/// Vector size of the physical collection.
pub const DEFAULT_VECTOR_SIZE: u64 = 1536;
/// Payload fields carrying a keyword index for filtered access.
pub const PAYLOAD_INDEX_FIELDS: &[&str] = &[
    "tenant_id",
    "collection_id",
    "agent_ids",
    "document_id",
    "document_type",
    "created_at",
];
/// Page size for the agents-update scroll. Documents with more chunks
/// than this are updated partially (logged at WARN by the adapters).
pub const AGENTS_SCROLL_LIMIT: u32 = 1000;

/// Embedding provenance recorded on every stored point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    /// Model that produced the vectors.
    pub embedding_model: String,
    /// Vector dimensionality.
    pub embedding_dimensions: u64,
    /// Wire encoding of the vectors.
    #[serde(default = "default_encoding_format")]
    pub encoding_format: String,
}

fn default_encoding_format() -> String {
    "float".to_string()
}

/// Outcome of a chunk upsert.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpsertOutcome {
    /// Points written.
    pub stored: usize,
    /// Points rejected or lost.
    pub failed: usize,
    /// Chunk ids of the failures.
    pub failed_ids: Vec<Uuid>,
}

/// One search hit, score descending.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Point id (the chunk id).
    pub id: String,
    /// Similarity score.
    pub score: f32,
    /// Full stored payload.
    pub payload: Value,
}

/// Parameters for a hierarchy-filtered search.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Owning tenant. Mandatory.
    pub tenant_id: Uuid,
    /// Requesting agent; only points listing it in `agent_ids` match.
    pub agent_id: Uuid,
    /// Query vector.
    pub query_vector: Vec<f32>,
    /// Optional narrowing to virtual collections.
    pub collection_ids: Option<Vec<String>>,
    /// Optional narrowing to documents.
    pub document_ids: Option<Vec<String>>,
    /// Hits to return.
    pub top_k: u64,
    /// Minimum score.
    pub threshold: f32,
}

/// How an agents update changes a document's agent list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentsOperation {
    /// Replace the list.
    Set,
    /// Union with the list.
    Add,
    /// Subtract the list.
    Remove,
}

impl AgentsOperation {
    /// Wire string for this operation.
    pub fn as_str(self) -> &'static str {
        match self {
            AgentsOperation::Set => "set",
            AgentsOperation::Add => "add",
            AgentsOperation::Remove => "remove",
        }
    }
}

impl std::str::FromStr for AgentsOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(AgentsOperation::Set),
            "add" => Ok(AgentsOperation::Add),
            "remove" => Ok(AgentsOperation::Remove),
            other => Err(format!("operation must be set, add, or remove, got '{other}'")),
        }
    }
}

/// Applies an agents operation to a chunk's current agent list.
///
/// `add` appends missing entries preserving order; `remove` keeps order,
/// so `add(a)` then `remove(a)` restores the original list.
pub fn apply_agents_operation(
    current: Vec<String>,
    targets: &[String],
    operation: AgentsOperation,
) -> Vec<String> {
    match operation {
        AgentsOperation::Set => targets.to_vec(),
        AgentsOperation::Add => {
            let mut merged = current;
            for target in targets {
                if !merged.contains(target) {
                    merged.push(target.clone());
                }
            }
            merged
        }
        AgentsOperation::Remove => current
            .into_iter()
            .filter(|agent| !targets.contains(agent))
            .collect(),
    }
}

/// Builds the full hierarchy payload for one chunk.
pub fn chunk_payload(
    chunk: &Chunk,
    tenant_id: Uuid,
    collection_id: &str,
    agent_ids: &[String],
    metadata: &EmbeddingMetadata,
) -> Value {
    let mut payload = json!({
        "tenant_id": tenant_id.to_string(),
        "collection_id": collection_id,
        "agent_ids": agent_ids,
        "document_id": chunk.document_id.to_string(),
        "chunk_id": chunk.chunk_id.to_string(),
        "content": chunk.content,
        "chunk_index": chunk.chunk_index,
        "keywords": chunk.keywords,
        "tags": chunk.tags,
        "embedding_model": metadata.embedding_model,
        "embedding_dimensions": metadata.embedding_dimensions,
        "encoding_format": metadata.encoding_format,
        "created_at": chunk.created_at.to_rfc3339(),
    });

    // Chunk-level metadata rides along without clobbering the hierarchy.
    if let Some(map) = payload.as_object_mut() {
        for (key, value) in &chunk.metadata {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    payload
}

/// Extracts the agent list from a stored payload.
pub fn agents_from_payload(payload: &Value) -> Vec<String> {
    payload
        .get("agent_ids")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
