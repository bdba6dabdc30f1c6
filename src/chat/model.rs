//! Chat request and session types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// Verified session context an inbound message arrives under.
#[derive(Debug, Clone, Copy)]
pub struct SessionState {
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Session id.
    pub session_id: Uuid,
    /// Responsible agent.
    pub agent_id: Uuid,
    /// Acting user, when authenticated.
    pub user_id: Option<Uuid>,
}

/// One message in a chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

/// An inbound chat request, enriched with session context before
/// dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Task correlation id; allocated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    /// Filled from the session state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    /// Filled from the session state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    /// Filled from the session state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,
    /// Filled from the session state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    /// Conversation turn(s) to process.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Tool definitions; their presence selects `advance` mode.
    #[serde(default)]
    pub tools: Vec<Value>,
    /// Free-form request metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ChatRequest {
    /// Fills the identity fields from the verified session.
    pub fn enrich(&mut self, session: &SessionState, task_id: Uuid) {
        self.tenant_id = Some(session.tenant_id);
        self.session_id = Some(session.session_id);
        self.agent_id = Some(session.agent_id);
        self.user_id = session.user_id;
        self.task_id = Some(task_id);
    }

    /// `advance` when the request carries tools, `simple` otherwise.
    pub fn mode(&self) -> &'static str {
        if self.tools.is_empty() { "simple" } else { "advance" }
    }

    /// Action payload: chat content only, identity travels on the
    /// envelope.
    pub fn payload(&self) -> Value {
        json!({
            "messages": self.messages,
            "tools": self.tools,
            "metadata": self.metadata,
        })
    }

    /// Last user message text, kept for persistence.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }
}
