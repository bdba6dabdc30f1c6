//! The unit of retrievable text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Hierarchy context a document is parsed under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentContext {
    /// Document id (always generated server-side).
    pub document_id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Virtual collection.
    pub collection_id: String,
    /// Agents granted access, possibly empty.
    pub agent_ids: Vec<String>,
}

/// One chunk of a parsed document.
///
/// Within a `(tenant_id, collection_id)` pair all chunks share the same
/// embedding model and dimensionality; that is enforced at task
/// admission, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk id, the vector point id.
    pub chunk_id: Uuid,
    /// Parent document.
    pub document_id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Virtual collection.
    pub collection_id: String,
    /// Agents granted access.
    pub agent_ids: Vec<String>,
    /// Chunk text.
    pub content: String,
    /// Position within the document.
    pub chunk_index: usize,
    /// Embedding, attached by the embedding callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Enrichment keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Enrichment tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Extraction metadata: `document_name`, `document_type`, char
    /// offsets, extraction method, word count, table/page hints.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Creates a chunk under a document context.
    pub fn new(context: &DocumentContext, content: String, chunk_index: usize) -> Self {
        Self {
            chunk_id: Uuid::new_v4(),
            document_id: context.document_id,
            tenant_id: context.tenant_id,
            collection_id: context.collection_id.clone(),
            agent_ids: context.agent_ids.clone(),
            content,
            chunk_index,
            embedding: None,
            keywords: Vec::new(),
            tags: Vec::new(),
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    /// Word count of the chunk content.
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}
