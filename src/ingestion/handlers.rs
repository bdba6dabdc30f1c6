//! Action-bus surface of the ingestion service.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::warn;
use uuid::Uuid;

use super::service::{DocumentIngestionRequest, IngestionService};
use crate::actions::{ActionDispatch, DomainAction, KeyValueStore};
use crate::relational::TableStore;
use crate::vectordb::{AgentsOperation, VectorStore};
use crate::worker::{ActionHandler, HandlerError, HandlerResult};

/// `ingestion.document.process`: admit a document from the bus.
pub struct ProcessDocumentHandler<B, V, T, K>
where
    B: ActionDispatch,
    V: VectorStore,
    T: TableStore,
    K: KeyValueStore,
{
    service: Arc<IngestionService<B, V, T, K>>,
}

impl<B, V, T, K> ProcessDocumentHandler<B, V, T, K>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    /// Wraps the orchestrator.
    pub fn new(service: Arc<IngestionService<B, V, T, K>>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl<B, V, T, K> ActionHandler for ProcessDocumentHandler<B, V, T, K>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    async fn handle(&self, action: DomainAction) -> HandlerResult<Option<Value>> {
        let request: DocumentIngestionRequest =
            serde_json::from_value(Value::Object(action.data.clone()))
                .map_err(|e| HandlerError::validation(format!("bad ingestion request: {e}")))?;
        let user_id = action
            .user_id
            .ok_or_else(|| HandlerError::validation("user_id is required"))?;

        let response = self
            .service
            .ingest_document(action.tenant_id, user_id, request)
            .await?;
        Ok(Some(serde_json::to_value(response).map_err(|e| {
            HandlerError::internal(e.to_string())
        })?))
    }
}

/// `ingestion.document.status`: report task progress.
pub struct DocumentStatusHandler<B, V, T, K>
where
    B: ActionDispatch,
    V: VectorStore,
    T: TableStore,
    K: KeyValueStore,
{
    service: Arc<IngestionService<B, V, T, K>>,
}

impl<B, V, T, K> DocumentStatusHandler<B, V, T, K>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    /// Wraps the orchestrator.
    pub fn new(service: Arc<IngestionService<B, V, T, K>>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl<B, V, T, K> ActionHandler for DocumentStatusHandler<B, V, T, K>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    async fn handle(&self, action: DomainAction) -> HandlerResult<Option<Value>> {
        let task_id = action
            .data
            .get("task_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .or(action.task_id)
            .ok_or_else(|| HandlerError::validation("task_id is required"))?;

        match self.service.task_status_by_id(task_id).await {
            Some(view) => Ok(Some(serde_json::to_value(view).map_err(|e| {
                HandlerError::internal(e.to_string())
            })?)),
            None => Ok(Some(json!({
                "task_id": task_id.to_string(),
                "status": "not_found",
                "message": "Task not found",
            }))),
        }
    }
}

/// `ingestion.document.agents.update`: change a document's agent access.
pub struct AgentsUpdateHandler<B, V, T, K>
where
    B: ActionDispatch,
    V: VectorStore,
    T: TableStore,
    K: KeyValueStore,
{
    service: Arc<IngestionService<B, V, T, K>>,
}

impl<B, V, T, K> AgentsUpdateHandler<B, V, T, K>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    /// Wraps the orchestrator.
    pub fn new(service: Arc<IngestionService<B, V, T, K>>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl<B, V, T, K> ActionHandler for AgentsUpdateHandler<B, V, T, K>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    async fn handle(&self, action: DomainAction) -> HandlerResult<Option<Value>> {
        let document_id = action
            .data
            .get("document_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| HandlerError::validation("document_id is required"))?;
        let agent_ids: Vec<String> = action
            .data
            .get("agent_ids")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .ok_or_else(|| HandlerError::validation("agent_ids is required"))?;
        let operation: AgentsOperation = action
            .data
            .get("operation")
            .and_then(Value::as_str)
            .unwrap_or("set")
            .parse()
            .map_err(HandlerError::validation)?;

        let result = self
            .service
            .update_document_agents(action.tenant_id, document_id, &agent_ids, operation)
            .await?;
        Ok(Some(result))
    }
}

/// `ingestion.embedding_callback`: resume the pipeline with embeddings.
pub struct EmbeddingCallbackHandler<B, V, T, K>
where
    B: ActionDispatch,
    V: VectorStore,
    T: TableStore,
    K: KeyValueStore,
{
    service: Arc<IngestionService<B, V, T, K>>,
}

impl<B, V, T, K> EmbeddingCallbackHandler<B, V, T, K>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    /// Wraps the orchestrator.
    pub fn new(service: Arc<IngestionService<B, V, T, K>>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl<B, V, T, K> ActionHandler for EmbeddingCallbackHandler<B, V, T, K>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    async fn handle(&self, action: DomainAction) -> HandlerResult<Option<Value>> {
        match self.service.handle_embedding_callback(&action).await {
            Ok(_) => Ok(None),
            Err(e) => {
                // The task is already marked FAILED where applicable; a
                // callback has no callback of its own to fail into.
                warn!(action_id = %action.action_id, error = %e, "embedding callback failed");
                Ok(None)
            }
        }
    }
}
