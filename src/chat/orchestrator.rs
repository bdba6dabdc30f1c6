//! The chat orchestrator.
//!
//! Coordinates sessions, agent configs, and the execution service: each
//! inbound message resolves its agent's configs through the cache, gets
//! enriched with session identity, and is dispatched with a callback
//! routing the response back here. Correctness relies on `task_id`
//! correlation, not on temporal ordering of actions.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{error, info};
use uuid::Uuid;

use super::client::ExecutionClient;
use super::model::{ChatRequest, SessionState};
use crate::actions::{
    ActionDispatch, CONVERSATION_MESSAGE_CREATE, DomainAction, KeyValueStore,
};
use crate::agents::ConfigCache;
use crate::fanout::FanoutHub;
use crate::relational::TableStore;
use crate::worker::{ActionHandler, HandlerResult};

/// Per-session chat coordination.
pub struct ChatOrchestrator<B, K, T>
where
    B: ActionDispatch,
    K: KeyValueStore,
    T: TableStore,
{
    client: ExecutionClient<B>,
    configs: ConfigCache<K, T>,
    fanout: Arc<FanoutHub>,
}

impl<B, K, T> ChatOrchestrator<B, K, T>
where
    B: ActionDispatch + 'static,
    K: KeyValueStore + 'static,
    T: TableStore + 'static,
{
    /// Wires the orchestrator.
    pub fn new(
        bus: Arc<B>,
        configs: ConfigCache<K, T>,
        fanout: Arc<FanoutHub>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            client: ExecutionClient::new(bus, service_name),
            configs,
            fanout,
        }
    }

    /// Returns the execution client (cancel path).
    pub fn client(&self) -> &ExecutionClient<B> {
        &self.client
    }

    /// Processes one inbound chat message. Errors are reported to the
    /// session, never surfaced to the transport.
    pub async fn process_chat_message(
        &self,
        session: &SessionState,
        mut request: ChatRequest,
    ) -> Uuid {
        let task_id = request.task_id.unwrap_or_else(Uuid::new_v4);

        info!(
            session_id = %session.session_id,
            task_id = %task_id,
            agent_id = %session.agent_id,
            "processing chat message"
        );

        let (execution_config, query_config, rag_config) =
            self.configs.get_agent_configs(session.agent_id).await;

        request.enrich(session, task_id);
        let mode = request.mode();

        self.fanout.send_to_session(
            session.session_id,
            "chat_processing",
            json!({
                "task_id": task_id.to_string(),
                "status": "processing",
                "mode": mode,
            }),
            Some(task_id),
        );

        if let Err(e) = self
            .client
            .execute_chat(&request, execution_config, query_config, rag_config, mode)
            .await
        {
            error!(
                session_id = %session.session_id,
                task_id = %task_id,
                error = %e,
                "chat dispatch failed"
            );
            self.fanout.send_error_to_session(
                session.session_id,
                "chat_processing_error",
                &e.to_string(),
                Some(task_id),
            );
        }

        task_id
    }
}

/// Handler for `orchestrator.chat.response`.
///
/// Delivers the response to the subscribed session and fires the
/// conversation-persistence action. There is no durable outbox: a lost
/// persistence action loses the exchange (v1 behavior).
pub struct ChatResponseHandler<B: ActionDispatch> {
    bus: Arc<B>,
    fanout: Arc<FanoutHub>,
    service_name: String,
}

impl<B: ActionDispatch> ChatResponseHandler<B> {
    /// Wires the handler.
    pub fn new(bus: Arc<B>, fanout: Arc<FanoutHub>, service_name: impl Into<String>) -> Self {
        Self {
            bus,
            fanout,
            service_name: service_name.into(),
        }
    }
}

#[async_trait::async_trait]
impl<B: ActionDispatch + 'static> ActionHandler for ChatResponseHandler<B> {
    async fn handle(&self, action: DomainAction) -> HandlerResult<Option<Value>> {
        let Some(session_id) = action.session_id else {
            // A response that cannot be routed is only logged; the chat
            // path has no queue to poison.
            error!(action_id = %action.action_id, "chat response without session_id");
            return Ok(None);
        };

        self.fanout.send_to_session(
            session_id,
            "chat_response",
            Value::Object(action.data.clone()),
            action.task_id,
        );

        let user_message = action
            .data
            .get("user_message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let agent_message = action
            .data
            .get("agent_message")
            .or_else(|| action.data.get("response"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let conversation_id = action
            .data
            .get("conversation_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or(session_id);

        let mut persist = DomainAction::new(
            CONVERSATION_MESSAGE_CREATE,
            action.tenant_id,
            &self.service_name,
        )
        .with_session(session_id)
        .with_data(json!({
            "conversation_id": conversation_id.to_string(),
            "user_message": user_message,
            "agent_message": agent_message,
            "metadata": action.metadata,
        }));
        persist.task_id = action.task_id;
        persist.agent_id = action.agent_id;
        persist.user_id = action.user_id;

        // Fire-and-forget by contract; failures are logged inside.
        let _ = self.bus.send_fire_and_forget(persist).await;

        Ok(None)
    }
}
