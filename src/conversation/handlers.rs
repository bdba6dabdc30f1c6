//! Fire-and-forget conversation handlers.
//!
//! Both action types tolerate malformed payloads with a logged skip;
//! they must never generate a retry storm or poison their queues.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::persistence::PersistenceService;
use crate::actions::DomainAction;
use crate::relational::TableStore;
use crate::worker::{ActionHandler, HandlerResult};

/// `conversation.message.create`: persist one exchange.
pub struct MessageCreateHandler<T: TableStore> {
    persistence: Arc<PersistenceService<T>>,
}

impl<T: TableStore> MessageCreateHandler<T> {
    /// Wraps the persistence service.
    pub fn new(persistence: Arc<PersistenceService<T>>) -> Self {
        Self { persistence }
    }
}

#[async_trait::async_trait]
impl<T: TableStore + 'static> ActionHandler for MessageCreateHandler<T> {
    async fn handle(&self, action: DomainAction) -> HandlerResult<Option<Value>> {
        let conversation_id = action
            .data
            .get("conversation_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());
        let user_message = action
            .data
            .get("user_message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty());
        let agent_message = action
            .data
            .get("agent_message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty());

        let (Some(conversation_id), Some(user_message), Some(agent_message)) =
            (conversation_id, user_message, agent_message)
        else {
            warn!(
                action_id = %action.action_id,
                "message.create missing required fields, skipping"
            );
            return Ok(None);
        };
        let (Some(session_id), Some(agent_id)) = (action.session_id, action.agent_id) else {
            warn!(
                action_id = %action.action_id,
                "message.create without session/agent context, skipping"
            );
            return Ok(None);
        };

        let result = self
            .persistence
            .save_conversation_exchange(
                conversation_id,
                action.tenant_id,
                session_id,
                agent_id,
                user_message,
                agent_message,
                action.data.get("metadata").cloned(),
            )
            .await;

        if let Err(e) = result {
            error!(
                action_id = %action.action_id,
                conversation_id = %conversation_id,
                error = %e,
                "exchange persistence failed"
            );
        }
        Ok(None)
    }
}

/// `conversation.session.closed`: end the active conversation row.
pub struct SessionClosedHandler<T: TableStore> {
    persistence: Arc<PersistenceService<T>>,
}

impl<T: TableStore> SessionClosedHandler<T> {
    /// Wraps the persistence service.
    pub fn new(persistence: Arc<PersistenceService<T>>) -> Self {
        Self { persistence }
    }
}

#[async_trait::async_trait]
impl<T: TableStore + 'static> ActionHandler for SessionClosedHandler<T> {
    async fn handle(&self, action: DomainAction) -> HandlerResult<Option<Value>> {
        let (Some(session_id), Some(agent_id)) = (action.session_id, action.agent_id) else {
            warn!(
                action_id = %action.action_id,
                "session.closed without session/agent context, skipping"
            );
            return Ok(None);
        };

        match self
            .persistence
            .mark_conversation_ended(action.tenant_id, session_id, agent_id)
            .await
        {
            Ok(true) => info!(session_id = %session_id, "session closed"),
            Ok(false) => {}
            Err(e) => error!(
                action_id = %action.action_id,
                session_id = %session_id,
                error = %e,
                "session close failed"
            ),
        }
        Ok(None)
    }
}
