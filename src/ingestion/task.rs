//! Ingestion task state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::actions::KeyValueStore;
use crate::agents::RagConfig;
use crate::parser::Chunk;

/// TTL of the shared task mirror, seconds.
pub const TASK_MIRROR_TTL_SECS: u64 = 3600;

/// Shared-KV key for a task mirror.
pub fn task_mirror_key(task_id: Uuid) -> String {
    format!("ingestion:task:{task_id}")
}

/// Ingestion task lifecycle.
///
/// `PROCESSING → CHUNKING → EMBEDDING → STORING → COMPLETED`, with any
/// state transitionable to `FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    /// Accepted, document being loaded.
    Processing,
    /// Chunks produced.
    Chunking,
    /// Waiting on the remote embedder.
    Embedding,
    /// Writing vectors and metadata.
    Storing,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
}

impl IngestionStatus {
    /// Wire string for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            IngestionStatus::Processing => "processing",
            IngestionStatus::Chunking => "chunking",
            IngestionStatus::Embedding => "embedding",
            IngestionStatus::Storing => "storing",
            IngestionStatus::Completed => "completed",
            IngestionStatus::Failed => "failed",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, IngestionStatus::Completed | IngestionStatus::Failed)
    }
}

impl std::fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ingestion work item.
///
/// Mutated only by the owning orchestrator task and the embed-callback
/// handler of the same process; mirrored to shared KV with a 1-hour TTL
/// for status reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionTask {
    /// Task id.
    pub task_id: Uuid,
    /// Document id, always generated server-side.
    pub document_id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Requesting user.
    pub user_id: Uuid,
    /// Virtual collection (generated as `col_<8 hex>` when absent).
    pub collection_id: String,
    /// Agents granted access, possibly empty.
    pub agent_ids: Vec<String>,
    /// Current lifecycle state.
    pub status: IngestionStatus,
    /// Chunks produced by the parser.
    pub total_chunks: u64,
    /// Chunks stored in the vector index.
    pub processed_chunks: u64,
    /// Completion percentage.
    pub percentage: f32,
    /// Last progress message.
    pub message: String,
    /// Failure description, set on FAILED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RAG config resolved at admission (request over defaults).
    pub rag_config: RagConfig,
    /// Document display name.
    pub document_name: String,
    /// Declared document type.
    pub document_type: String,
    /// Request-supplied metadata, persisted with the document row.
    #[serde(default)]
    pub request_metadata: Map<String, Value>,
    /// In-flight chunks between parse and store.
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    /// Admission timestamp.
    pub created_at: DateTime<Utc>,
}

/// In-process task map with a shared-KV mirror.
pub struct TaskStore<K: KeyValueStore> {
    tasks: parking_lot::RwLock<HashMap<Uuid, IngestionTask>>,
    kv: Arc<K>,
    ttl_secs: u64,
}

impl<K: KeyValueStore> std::fmt::Debug for TaskStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("in_memory", &self.tasks.read().len())
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl<K: KeyValueStore> TaskStore<K> {
    /// Creates a store mirroring into `kv` with `ttl_secs`.
    pub fn new(kv: Arc<K>, ttl_secs: u64) -> Self {
        Self {
            tasks: parking_lot::RwLock::new(HashMap::new()),
            kv,
            ttl_secs,
        }
    }

    /// Writes a task to memory and refreshes its mirror. Mirror failures
    /// are logged, never fatal: the in-process map is authoritative for
    /// the owning process.
    pub async fn save(&self, task: &IngestionTask) {
        self.tasks.write().insert(task.task_id, task.clone());

        match serde_json::to_string(task) {
            Ok(raw) => {
                if let Err(e) = self
                    .kv
                    .set_with_ttl(&task_mirror_key(task.task_id), &raw, self.ttl_secs)
                    .await
                {
                    warn!(task_id = %task.task_id, error = %e, "task mirror write failed");
                }
            }
            Err(e) => warn!(task_id = %task.task_id, error = %e, "task not serializable"),
        }
    }

    /// Reads a task: in-process map first, shared mirror second.
    pub async fn get(&self, task_id: Uuid) -> Option<IngestionTask> {
        if let Some(task) = self.tasks.read().get(&task_id) {
            return Some(task.clone());
        }

        match self.kv.get(&task_mirror_key(task_id)).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "unreadable task mirror");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "task mirror read failed");
                None
            }
        }
    }

    /// Drops a task from the in-process map (terminal cleanup; the
    /// mirror expires on its own).
    pub fn evict(&self, task_id: Uuid) {
        self.tasks.write().remove(&task_id);
    }
}

/// Normalizes `agent_ids` arriving as a JSON-encoded string inside a
/// single-element list (a recurring client artifact: `["[]"]`,
/// `["[\"id\"]"]`, `[""]`).
pub fn normalize_agent_ids(agent_ids: Vec<String>) -> Vec<String> {
    if agent_ids.len() != 1 {
        return agent_ids;
    }

    let raw = agent_ids[0].trim();
    if raw.is_empty() || raw == "[]" || raw == "null" || raw == "None" {
        return Vec::new();
    }
    if raw.starts_with('[') && raw.ends_with(']') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) {
            return items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) if !s.is_empty() => Some(s),
                    _ => None,
                })
                .collect();
        }
        // Unparseable: keep what the client sent.
    }
    agent_ids
}
