//! Typed rows and table names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::client::TableStore;
use super::error::TableStoreResult;

/// View joining agents with their resolved system prompt.
pub const TABLE_AGENTS_WITH_PROMPT: &str = "agents_with_prompt";
/// Tenants table.
pub const TABLE_TENANTS: &str = "tenants";
/// User/tenant membership table.
pub const TABLE_USER_TENANTS: &str = "user_tenants";
/// Ingested document metadata table.
pub const TABLE_DOCUMENTS_RAG: &str = "documents_rag";
/// Conversations table.
pub const TABLE_CONVERSATIONS: &str = "conversations";
/// Messages table.
pub const TABLE_MESSAGES: &str = "messages";

/// Basic tenant record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantInfo {
    /// Tenant id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Billing plan.
    #[serde(default)]
    pub plan_type: Option<String>,
    /// Tenant settings blob.
    #[serde(default)]
    pub settings: Option<Value>,
}

/// One `documents_rag` row.
///
/// `agent_id` is a transitional scalar kept for schema compatibility
/// (NOT NULL constraint); the authoritative list lives in
/// `metadata.agent_ids`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRow {
    /// User that created the document.
    pub profile_id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Virtual collection.
    pub collection_id: String,
    /// Document id.
    pub document_id: Uuid,
    /// Display name.
    pub document_name: String,
    /// Declared document type.
    pub document_type: String,
    /// Embedding model used for every chunk of this document.
    pub embedding_model: String,
    /// Embedding dimensionality.
    pub embedding_dimensions: u64,
    /// Wire encoding of embeddings.
    pub encoding_format: String,
    /// Ingestion outcome.
    pub status: String,
    /// Chunks produced by the parser.
    pub total_chunks: u64,
    /// Chunks stored in the vector index.
    pub processed_chunks: u64,
    /// Metadata blob, carries the authoritative `agent_ids` list.
    pub metadata: Value,
    /// Transitional scalar agent column.
    pub agent_id: Uuid,
}

/// One `conversations` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    /// Conversation id (client-correlated).
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Session the conversation belongs to.
    pub session_id: Uuid,
    /// Responsible agent.
    pub agent_id: Uuid,
    /// Whether the conversation is still open.
    pub is_active: bool,
    /// Close timestamp, set by `conversation.session.closed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// One `messages` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    /// Parent conversation.
    pub conversation_id: Uuid,
    /// `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
    /// Exchange metadata.
    #[serde(default)]
    pub metadata: Value,
}

/// Fetches the raw `agents_with_prompt` row for an agent.
pub async fn fetch_agent_row<T: TableStore>(
    store: &T,
    agent_id: Uuid,
) -> TableStoreResult<Option<Value>> {
    store
        .select_one(TABLE_AGENTS_WITH_PROMPT, &[("id", &agent_id.to_string())])
        .await
}

/// Fetches basic tenant information.
pub async fn fetch_tenant_info<T: TableStore>(
    store: &T,
    tenant_id: Uuid,
) -> TableStoreResult<Option<TenantInfo>> {
    let row = store
        .select_one(TABLE_TENANTS, &[("id", &tenant_id.to_string())])
        .await?;
    match row {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

/// Returns whether `user_id` belongs to `tenant_id`.
pub async fn check_tenant_membership<T: TableStore>(
    store: &T,
    user_id: Uuid,
    tenant_id: Uuid,
) -> TableStoreResult<bool> {
    let row = store
        .select_one(
            TABLE_USER_TENANTS,
            &[
                ("user_id", &user_id.to_string()),
                ("tenant_id", &tenant_id.to_string()),
            ],
        )
        .await?;
    Ok(row.is_some())
}
