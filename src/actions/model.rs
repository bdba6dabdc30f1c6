//! The domain-action envelope.
//!
//! An action is the sole inter-service unit of work: a typed, routable
//! record carrying tenant/session/task context, optional typed config
//! blocks, and an opaque payload. `action_type` (a dotted domain string
//! such as `ingestion.document.process`) is the only routing key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::agents::{ExecutionConfig, QueryConfig, RagConfig};

/// Ingestion: process one document.
pub const INGESTION_DOCUMENT_PROCESS: &str = "ingestion.document.process";
/// Ingestion: query task status.
pub const INGESTION_DOCUMENT_STATUS: &str = "ingestion.document.status";
/// Ingestion: update document agent access.
pub const INGESTION_DOCUMENT_AGENTS_UPDATE: &str = "ingestion.document.agents.update";
/// Ingestion: embeddings produced by the remote embedder.
pub const INGESTION_EMBEDDING_CALLBACK: &str = "ingestion.embedding_callback";
/// Outbound to the embedder; replies arrive as the callback above.
pub const EMBEDDING_BATCH_PROCESS: &str = "embedding.batch_process";
/// Execution: plain chat turn.
pub const EXECUTION_CHAT_SIMPLE: &str = "execution.chat.simple";
/// Execution: tool-using chat turn.
pub const EXECUTION_CHAT_ADVANCE: &str = "execution.chat.advance";
/// Execution: cancel a running task.
pub const EXECUTION_TASK_CANCEL: &str = "execution.task.cancel";
/// Orchestrator: chat response callback.
pub const ORCHESTRATOR_CHAT_RESPONSE: &str = "orchestrator.chat.response";
/// Orchestrator: drop cached agent config in peer processes.
pub const ORCHESTRATOR_CONFIG_INVALIDATE: &str = "orchestrator.config.invalidate";
/// Conversation: persist one exchange.
pub const CONVERSATION_MESSAGE_CREATE: &str = "conversation.message.create";
/// Conversation: close the active session row.
pub const CONVERSATION_SESSION_CLOSED: &str = "conversation.session.closed";

/// Returns the broker queue name for an action type.
pub fn queue_for(action_type: &str) -> String {
    format!("actions:{action_type}")
}

/// Returns the correlation list a `send_and_wait` reply is pushed to.
pub fn reply_queue_for(action_id: Uuid) -> String {
    format!("actions:replies:{action_id}")
}

/// A typed, routable inter-service message.
///
/// Serializes to a self-describing record; fields this version does not
/// know about are preserved in `extra` so services at different versions
/// remain compatible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainAction {
    /// Unique id for the lifetime of the broker retention window.
    pub action_id: Uuid,

    /// Dotted domain routing key.
    pub action_type: String,

    /// Owning tenant.
    pub tenant_id: Uuid,

    /// Session this action belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,

    /// Task correlation id. Mandatory for request/response exchanges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,

    /// Agent involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,

    /// Acting user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    /// Service that emitted the action.
    pub origin_service: String,

    /// If set, the recipient must produce exactly one action of this
    /// type with the same `task_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_action_type: Option<String>,

    /// Private correlation list for pseudo-synchronous sends. Replies are
    /// pushed here instead of the callback type's queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    /// Execution config block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_config: Option<ExecutionConfig>,

    /// Query config block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_config: Option<QueryConfig>,

    /// RAG config block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_config: Option<RagConfig>,

    /// Opaque payload.
    #[serde(default)]
    pub data: Map<String, Value>,

    /// Opaque metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Unknown fields from newer peers, preserved opaquely.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DomainAction {
    /// Creates an action with a fresh `action_id` and timestamp.
    pub fn new(
        action_type: impl Into<String>,
        tenant_id: Uuid,
        origin_service: impl Into<String>,
    ) -> Self {
        Self {
            action_id: Uuid::new_v4(),
            action_type: action_type.into(),
            tenant_id,
            session_id: None,
            task_id: None,
            agent_id: None,
            user_id: None,
            origin_service: origin_service.into(),
            callback_action_type: None,
            reply_to: None,
            execution_config: None,
            query_config: None,
            rag_config: None,
            data: Map::new(),
            metadata: Map::new(),
            created_at: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Sets the session id.
    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Sets the task id.
    pub fn with_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Sets the agent id.
    pub fn with_agent(mut self, agent_id: Uuid) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Sets the acting user.
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Declares the reply action type, making this a request/response send.
    pub fn with_callback(mut self, callback_action_type: impl Into<String>) -> Self {
        self.callback_action_type = Some(callback_action_type.into());
        self
    }

    /// Sets the opaque payload from a JSON object.
    ///
    /// Non-object values are wrapped under a `"value"` key so the payload
    /// stays a map on the wire.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = match data {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self
    }

    /// Merges one metadata key.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// True when the sender expects exactly one reply action.
    pub fn expects_callback(&self) -> bool {
        self.callback_action_type.is_some()
    }

    /// Builds the reply action for this request.
    ///
    /// The reply carries the callback action type, the same `task_id`,
    /// and the replying service as `origin_service`. Returns `None` when
    /// the action is fire-and-forget.
    pub fn reply(&self, origin_service: &str, data: Value) -> Option<DomainAction> {
        let callback_type = self.callback_action_type.as_deref()?;
        let mut reply = DomainAction::new(callback_type, self.tenant_id, origin_service);
        reply.session_id = self.session_id;
        reply.task_id = self.task_id;
        reply.agent_id = self.agent_id;
        reply.user_id = self.user_id;
        reply.reply_to = self.reply_to.clone();
        Some(reply.with_data(data))
    }
}
