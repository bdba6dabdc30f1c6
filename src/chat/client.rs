//! Client for the remote execution service.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::model::ChatRequest;
use crate::actions::{
    ActionBusResult, ActionDispatch, DomainAction, EXECUTION_TASK_CANCEL,
    ORCHESTRATOR_CHAT_RESPONSE,
};
use crate::agents::{ExecutionConfig, QueryConfig, RagConfig};

/// Sends chat work to the execution service over the action bus.
pub struct ExecutionClient<B: ActionDispatch> {
    bus: Arc<B>,
    service_name: String,
}

impl<B: ActionDispatch> ExecutionClient<B> {
    /// Creates a client emitting actions as `service_name`.
    pub fn new(bus: Arc<B>, service_name: impl Into<String>) -> Self {
        Self {
            bus,
            service_name: service_name.into(),
        }
    }

    /// Dispatches a chat turn. `mode` selects `execution.chat.simple` or
    /// `execution.chat.advance`; the response arrives later as an
    /// `orchestrator.chat.response` action.
    pub async fn execute_chat(
        &self,
        request: &ChatRequest,
        execution_config: ExecutionConfig,
        query_config: QueryConfig,
        rag_config: RagConfig,
        mode: &str,
    ) -> ActionBusResult<()> {
        let action_type = format!("execution.chat.{mode}");

        let mut action = DomainAction::new(
            &action_type,
            request.tenant_id.unwrap_or_default(),
            &self.service_name,
        )
        .with_callback(ORCHESTRATOR_CHAT_RESPONSE)
        .with_data(request.payload());
        action.session_id = request.session_id;
        action.task_id = request.task_id;
        action.agent_id = request.agent_id;
        action.user_id = request.user_id;
        action.execution_config = Some(execution_config);
        action.query_config = Some(query_config);
        action.rag_config = Some(rag_config);

        let action_id = action.action_id;
        self.bus
            .send_with_callback(action, ORCHESTRATOR_CHAT_RESPONSE)
            .await?;

        info!(
            action_id = %action_id,
            action_type = %action_type,
            task_id = ?request.task_id,
            mode,
            "chat request dispatched to execution service"
        );
        Ok(())
    }

    /// Fire-and-forget task cancellation. The receiving service observes
    /// the cancel at its next suspension point; the compliant outcome is
    /// a FAILED task with reason `cancelled`.
    pub async fn cancel_task(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
        task_id: Uuid,
        agent_id: Uuid,
        reason: &str,
    ) -> ActionBusResult<()> {
        let action = DomainAction::new(EXECUTION_TASK_CANCEL, tenant_id, &self.service_name)
            .with_session(session_id)
            .with_task(task_id)
            .with_agent(agent_id)
            .with_data(json!({"reason": reason}));

        self.bus.send_fire_and_forget(action).await?;

        info!(
            session_id = %session_id,
            task_id = %task_id,
            reason,
            "cancellation dispatched"
        );
        Ok(())
    }
}
