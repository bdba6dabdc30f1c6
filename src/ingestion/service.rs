//! The ingestion orchestrator.
//!
//! Admission runs inline with the request: ids are generated, the RAG
//! config resolved, and the collection checked for embedding-model
//! consistency. The pipeline itself runs as a supervised tokio task up to
//! the point where the embed request leaves the process; it resumes in
//! the embedding callback handler, which looks the task up by `task_id`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::error::{IngestionError, IngestionResult};
use super::task::{IngestionStatus, IngestionTask, TaskStore, normalize_agent_ids};
use crate::actions::{
    ActionDispatch, DomainAction, EMBEDDING_BATCH_PROCESS, INGESTION_EMBEDDING_CALLBACK,
    KeyValueStore,
};
use crate::agents::RagConfig;
use crate::config::Settings;
use crate::fanout::FanoutHub;
use crate::parser::{
    ChunkingParams, DocumentContext, DocumentInput, DocumentParser, DocumentSource, DocumentType,
};
use crate::relational::{DocumentRow, TABLE_DOCUMENTS_RAG, TableStore};
use crate::vectordb::{
    AgentsOperation, EmbeddingMetadata, UpsertOutcome, VectorStore, apply_agents_operation,
};

/// One document ingestion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIngestionRequest {
    /// Display name.
    pub document_name: String,
    /// Declared type.
    pub document_type: DocumentType,
    /// Inline content, one of the three sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Local/spooled file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Remote page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Virtual collection; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    /// Agents granted access.
    #[serde(default)]
    pub agent_ids: Vec<String>,
    /// RAG config for this document; defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_config: Option<RagConfig>,
    /// Free-form metadata recorded on chunks and the document row.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl DocumentIngestionRequest {
    fn source(&self) -> IngestionResult<DocumentSource> {
        if let Some(content) = &self.content {
            return Ok(DocumentSource::Inline(content.clone()));
        }
        if let Some(path) = &self.file_path {
            return Ok(DocumentSource::File(path.into()));
        }
        if let Some(url) = &self.url {
            return Ok(DocumentSource::Url(url.clone()));
        }
        Err(IngestionError::Validation {
            message: "no content source provided (expected content, file_path, or url)"
                .to_string(),
        })
    }
}

/// Accepted-ingestion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResponse {
    /// Task to watch.
    pub task_id: Uuid,
    /// Generated document id.
    pub document_id: Uuid,
    /// Effective collection.
    pub collection_id: String,
    /// Normalized agent list.
    pub agent_ids: Vec<String>,
    /// Initial status (always `processing`).
    pub status: IngestionStatus,
    /// Human-readable note.
    pub message: String,
    /// Progress WebSocket URL, filled by the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websocket_url: Option<String>,
}

/// Owner-checked task status view.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusView {
    /// Task id.
    pub task_id: Uuid,
    /// Lifecycle state.
    pub status: IngestionStatus,
    /// Last progress message.
    pub message: String,
    /// Completion percentage.
    pub percentage: f32,
    /// Chunks produced.
    pub total_chunks: u64,
    /// Chunks stored.
    pub processed_chunks: u64,
    /// Failure description, if failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The ingestion orchestrator. One per ingestion service process.
pub struct IngestionService<B, V, T, K>
where
    B: ActionDispatch,
    V: VectorStore,
    T: TableStore,
    K: KeyValueStore,
{
    bus: Arc<B>,
    vector: Arc<V>,
    store: Arc<T>,
    tasks: TaskStore<K>,
    parser: DocumentParser,
    fanout: Arc<FanoutHub>,
    settings: Arc<Settings>,
}

impl<B, V, T, K> std::fmt::Debug for IngestionService<B, V, T, K>
where
    B: ActionDispatch,
    V: VectorStore,
    T: TableStore,
    K: KeyValueStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionService")
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

impl<B, V, T, K> IngestionService<B, V, T, K>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    /// Wires the orchestrator.
    pub fn new(
        bus: Arc<B>,
        vector: Arc<V>,
        store: Arc<T>,
        kv: Arc<K>,
        fanout: Arc<FanoutHub>,
        settings: Arc<Settings>,
    ) -> Self {
        let ttl = settings.task_mirror_ttl_secs;
        Self {
            bus,
            vector,
            store,
            tasks: TaskStore::new(kv, ttl),
            parser: DocumentParser::new(),
            fanout,
            settings,
        }
    }

    /// Returns the progress fan-out hub.
    pub fn fanout(&self) -> &Arc<FanoutHub> {
        &self.fanout
    }

    /// Admits a document and launches its pipeline.
    #[instrument(skip(self, request), fields(tenant_id = %tenant_id, document_name = %request.document_name))]
    pub async fn ingest_document(
        self: &Arc<Self>,
        tenant_id: Uuid,
        user_id: Uuid,
        mut request: DocumentIngestionRequest,
    ) -> IngestionResult<IngestionResponse> {
        let task_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();

        let collection_id = match request.collection_id.take().filter(|c| !c.is_empty()) {
            Some(collection_id) => collection_id,
            None => {
                let generated = generate_collection_id();
                info!(collection_id = %generated, "generated collection id");
                generated
            }
        };

        let rag_config = request.rag_config.clone().unwrap_or_default();
        let agent_ids = normalize_agent_ids(request.agent_ids.clone());

        // Fails admission before any task exists.
        request.source()?;
        self.validate_collection_consistency(tenant_id, &collection_id, &rag_config)
            .await?;

        let task = IngestionTask {
            task_id,
            document_id,
            tenant_id,
            user_id,
            collection_id: collection_id.clone(),
            agent_ids: agent_ids.clone(),
            status: IngestionStatus::Processing,
            total_chunks: 0,
            processed_chunks: 0,
            percentage: 0.0,
            message: "Document ingestion started".to_string(),
            error: None,
            rag_config,
            document_name: request.document_name.clone(),
            document_type: request.document_type.as_str().to_string(),
            request_metadata: request.metadata.clone(),
            chunks: Vec::new(),
            created_at: chrono::Utc::now(),
        };
        self.tasks.save(&task).await;

        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.run_pipeline(task_id, request).await;
        });

        Ok(IngestionResponse {
            task_id,
            document_id,
            collection_id,
            agent_ids,
            status: IngestionStatus::Processing,
            message: "Document ingestion started".to_string(),
            websocket_url: None,
        })
    }

    /// Rejects admission when the collection already holds documents
    /// embedded with a different model.
    async fn validate_collection_consistency(
        &self,
        tenant_id: Uuid,
        collection_id: &str,
        rag_config: &RagConfig,
    ) -> IngestionResult<()> {
        let existing = self
            .store
            .select_one(
                TABLE_DOCUMENTS_RAG,
                &[
                    ("tenant_id", &tenant_id.to_string()),
                    ("collection_id", collection_id),
                ],
            )
            .await;

        let row = match existing {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(()),
            Err(e) => {
                // A flaky store must not block ingestion; the invariant
                // is re-checkable and the row write happens at the end.
                warn!(collection_id, error = %e, "consistency check skipped");
                return Ok(());
            }
        };

        let existing_model = row
            .get("embedding_model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let existing_dimensions = row
            .get("embedding_dimensions")
            .and_then(Value::as_u64)
            .unwrap_or_default();

        if existing_model != rag_config.embedding_model
            || existing_dimensions != rag_config.embedding_dimensions
        {
            return Err(IngestionError::CollectionModelMismatch {
                collection_id: collection_id.to_string(),
                existing_model,
                existing_dimensions,
            });
        }
        Ok(())
    }

    /// The supervised pipeline: parse → chunk → dispatch the embed
    /// request. Resumes in [`Self::handle_embedding_callback`].
    async fn run_pipeline(self: Arc<Self>, task_id: Uuid, request: DocumentIngestionRequest) {
        if let Err(e) = self.try_run_pipeline(task_id, request).await {
            error!(task_id = %task_id, error = %e, "ingestion pipeline failed");
            self.fail_task(task_id, &e.to_string()).await;
        }
    }

    async fn try_run_pipeline(
        &self,
        task_id: Uuid,
        request: DocumentIngestionRequest,
    ) -> IngestionResult<()> {
        let mut task = self
            .tasks
            .get(task_id)
            .await
            .ok_or(IngestionError::TaskNotFound { task_id })?;

        self.update_progress(&mut task, IngestionStatus::Processing, "Processing document", 10.0)
            .await;

        let input = DocumentInput {
            document_name: request.document_name.clone(),
            document_type: request.document_type,
            source: request.source()?,
            metadata: request.metadata.clone(),
        };
        let context = DocumentContext {
            document_id: task.document_id,
            tenant_id: task.tenant_id,
            collection_id: task.collection_id.clone(),
            agent_ids: task.agent_ids.clone(),
        };
        let params = ChunkingParams {
            chunk_size: task.rag_config.chunk_size,
            chunk_overlap: task.rag_config.chunk_overlap,
        };
        let max_bytes = self
            .settings
            .max_document_bytes(request.document_type.as_str());

        let chunks = self.parser.parse(&input, &context, params, max_bytes).await?;
        task.total_chunks = chunks.len() as u64;
        task.chunks = chunks;

        let chunking_message = format!("Created {} chunks", task.total_chunks);
        self.update_progress(
            &mut task,
            IngestionStatus::Chunking,
            &chunking_message,
            30.0,
        )
        .await;

        self.update_progress(
            &mut task,
            IngestionStatus::Embedding,
            "Generating embeddings",
            50.0,
        )
        .await;

        self.request_embeddings(&task).await
    }

    /// Sends the batch-embed request with the ingestion callback
    /// declared. A failed send surfaces so the task can be failed.
    async fn request_embeddings(&self, task: &IngestionTask) -> IngestionResult<()> {
        let texts: Vec<&str> = task.chunks.iter().map(|c| c.content.as_str()).collect();
        let chunk_ids: Vec<String> = task
            .chunks
            .iter()
            .map(|c| c.chunk_id.to_string())
            .collect();

        let mut action = DomainAction::new(
            EMBEDDING_BATCH_PROCESS,
            task.tenant_id,
            &self.settings.service_name,
        )
        .with_task(task.task_id)
        .with_user(task.user_id)
        .with_callback(INGESTION_EMBEDDING_CALLBACK)
        .with_data(json!({
            "texts": texts,
            "chunk_ids": chunk_ids,
            "model": task.rag_config.embedding_model,
        }))
        .with_metadata("task_id", json!(task.task_id.to_string()))
        .with_metadata("tenant_id", json!(task.tenant_id.to_string()))
        .with_metadata("total_chunks", json!(task.total_chunks));
        action.rag_config = Some(task.rag_config.clone());

        self.bus
            .send_with_callback(action, INGESTION_EMBEDDING_CALLBACK)
            .await?;

        info!(
            task_id = %task.task_id,
            chunks = task.total_chunks,
            "embed request dispatched"
        );
        Ok(())
    }

    /// Joins the embedding callback back into the pipeline: attach
    /// embeddings, upsert vectors, persist metadata, complete.
    #[instrument(skip(self, action), fields(action_id = %action.action_id))]
    pub async fn handle_embedding_callback(
        &self,
        action: &DomainAction,
    ) -> IngestionResult<Value> {
        let task_id = action
            .task_id
            .or_else(|| {
                action
                    .data
                    .get("task_id")
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok())
            })
            .ok_or_else(|| IngestionError::Validation {
                message: "embedding callback without task_id".to_string(),
            })?;

        let Some(mut task) = self.tasks.get(task_id).await else {
            // Late or replayed callback: nothing to resume.
            warn!(task_id = %task_id, "embedding callback for unknown task, dropping");
            return Err(IngestionError::TaskNotFound { task_id });
        };

        // The embedder reports its own failures through the same type.
        if let Some(embed_error) = action.data.get("error").and_then(Value::as_str) {
            self.fail_task(task_id, embed_error).await;
            return Err(IngestionError::Validation {
                message: format!("embedding failed: {embed_error}"),
            });
        }

        match self.finish_task(&mut task, action).await {
            Ok(outcome) => Ok(json!({
                "status": "completed",
                "processed_chunks": outcome.stored,
            })),
            Err(e) => {
                self.fail_task(task_id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn finish_task(
        &self,
        task: &mut IngestionTask,
        action: &DomainAction,
    ) -> IngestionResult<UpsertOutcome> {
        attach_embeddings(task, action)?;

        self.update_progress(task, IngestionStatus::Storing, "Storing vectors", 80.0)
            .await;

        let metadata = embedding_metadata_from(action, &task.rag_config);
        let outcome = self
            .vector
            .upsert_chunks(
                &task.chunks,
                task.tenant_id,
                &task.collection_id,
                &task.agent_ids,
                &metadata,
            )
            .await?;
        task.processed_chunks = outcome.stored as u64;

        if let Err(e) = self.persist_document_metadata(task, &metadata).await {
            // Open question resolved for v1: no compensation, the vector
            // writes stay. Log enough to reclaim them by hand.
            error!(
                task_id = %task.task_id,
                document_id = %task.document_id,
                stored = outcome.stored,
                error = %e,
                "metadata insert failed after vector upsert, vectors orphaned"
            );
            return Err(e);
        }

        self.update_progress(task, IngestionStatus::Completed, "Ingestion completed", 100.0)
            .await;

        info!(
            task_id = %task.task_id,
            document_id = %task.document_id,
            stored = outcome.stored,
            failed = outcome.failed,
            "ingestion completed"
        );
        Ok(outcome)
    }

    async fn persist_document_metadata(
        &self,
        task: &IngestionTask,
        embedding: &EmbeddingMetadata,
    ) -> IngestionResult<()> {
        let mut metadata = task.request_metadata.clone();
        metadata.insert("agent_ids".to_string(), json!(task.agent_ids));

        let row = DocumentRow {
            profile_id: task.user_id,
            tenant_id: task.tenant_id,
            collection_id: task.collection_id.clone(),
            document_id: task.document_id,
            document_name: task.document_name.clone(),
            document_type: task.document_type.clone(),
            embedding_model: embedding.embedding_model.clone(),
            embedding_dimensions: embedding.embedding_dimensions,
            encoding_format: embedding.encoding_format.clone(),
            status: "completed".to_string(),
            total_chunks: task.total_chunks,
            processed_chunks: task.processed_chunks,
            metadata: Value::Object(metadata),
            agent_id: transitional_agent_id(&task.agent_ids),
        };

        self.store
            .insert(TABLE_DOCUMENTS_RAG, serde_json::to_value(&row).map_err(
                |e| IngestionError::Validation {
                    message: e.to_string(),
                },
            )?)
            .await?;
        Ok(())
    }

    /// Deletes a document: vector points first, metadata row second. The
    /// ordering leaves an orphan metadata row on partial failure, never
    /// orphan vectors.
    pub async fn delete_document(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
        collection_id: &str,
    ) -> IngestionResult<Value> {
        self.vector
            .delete_document(tenant_id, collection_id, document_id)
            .await?;

        self.store
            .delete(
                TABLE_DOCUMENTS_RAG,
                &[
                    ("tenant_id", &tenant_id.to_string()),
                    ("document_id", &document_id.to_string()),
                    ("collection_id", collection_id),
                ],
            )
            .await?;

        Ok(json!({
            "message": "Document deleted successfully",
            "document_id": document_id.to_string(),
        }))
    }

    /// Updates agent access on a document: vector payloads first, the
    /// metadata JSON second. A vector failure stops before the row is
    /// touched.
    pub async fn update_document_agents(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
        agent_ids: &[String],
        operation: AgentsOperation,
    ) -> IngestionResult<Value> {
        let updated = self
            .vector
            .update_chunk_agents(tenant_id, document_id, agent_ids, operation)
            .await?;
        if updated == 0 {
            return Err(IngestionError::DocumentNotFound { document_id });
        }

        let filters = [
            ("tenant_id", tenant_id.to_string()),
            ("document_id", document_id.to_string()),
        ];
        let filter_refs: Vec<(&str, &str)> =
            filters.iter().map(|(k, v)| (*k, v.as_str())).collect();

        if let Some(row) = self
            .store
            .select_one(TABLE_DOCUMENTS_RAG, &filter_refs)
            .await?
        {
            let mut metadata = row
                .get("metadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let current = metadata
                .get("agent_ids")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            let next = apply_agents_operation(current, agent_ids, operation);

            metadata.insert("agent_ids".to_string(), json!(next));
            self.store
                .update(
                    TABLE_DOCUMENTS_RAG,
                    &filter_refs,
                    json!({
                        "metadata": metadata,
                        "agent_id": transitional_agent_id(&next).to_string(),
                    }),
                )
                .await?;
        }

        Ok(json!({
            "success": true,
            "document_id": document_id.to_string(),
            "agent_ids": agent_ids,
            "operation": operation.as_str(),
        }))
    }

    /// Owner-checked status read: in-process map first, shared mirror
    /// second. A foreign `user_id` sees nothing.
    pub async fn get_task_status(
        &self,
        task_id: Uuid,
        user_id: Uuid,
    ) -> Option<TaskStatusView> {
        let task = self.tasks.get(task_id).await?;
        if task.user_id != user_id {
            return None;
        }
        Some(TaskStatusView {
            task_id,
            status: task.status,
            message: task.message,
            percentage: task.percentage,
            total_chunks: task.total_chunks,
            processed_chunks: task.processed_chunks,
            error: task.error,
        })
    }

    /// Unchecked status read for the action-bus surface.
    pub async fn task_status_by_id(&self, task_id: Uuid) -> Option<TaskStatusView> {
        let task = self.tasks.get(task_id).await?;
        Some(TaskStatusView {
            task_id,
            status: task.status,
            message: task.message,
            percentage: task.percentage,
            total_chunks: task.total_chunks,
            processed_chunks: task.processed_chunks,
            error: task.error,
        })
    }

    async fn update_progress(
        &self,
        task: &mut IngestionTask,
        status: IngestionStatus,
        message: &str,
        percentage: f32,
    ) {
        task.status = status;
        task.message = message.to_string();
        task.percentage = percentage;
        self.tasks.save(task).await;

        self.fanout.send_progress_update(
            task.task_id,
            status.as_str(),
            message,
            percentage,
            Some(task.total_chunks),
            Some(task.processed_chunks),
            task.error.clone(),
        );
    }

    /// Marks a task FAILED, retaining its last percentage, and emits the
    /// final progress frame.
    pub async fn fail_task(&self, task_id: Uuid, error: &str) {
        let Some(mut task) = self.tasks.get(task_id).await else {
            warn!(task_id = %task_id, "cannot fail unknown task");
            return;
        };
        if task.status.is_terminal() {
            return;
        }

        task.status = IngestionStatus::Failed;
        task.error = Some(error.to_string());
        task.message = "Ingestion failed".to_string();
        self.tasks.save(&task).await;

        self.fanout.send_progress_update(
            task.task_id,
            IngestionStatus::Failed.as_str(),
            &task.message,
            task.percentage,
            Some(task.total_chunks),
            Some(task.processed_chunks),
            Some(error.to_string()),
        );
    }
}

fn generate_collection_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("col_{}", &hex[..8])
}

/// Generates a shared collection id for a batch ingest.
pub fn generate_batch_collection_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("batch_{}", &hex[..8])
}

fn transitional_agent_id(agent_ids: &[String]) -> Uuid {
    // The scalar column is NOT NULL for schema compatibility; a
    // throwaway id fills it when no agent is assigned. The authoritative
    // list is metadata.agent_ids. Scheduled for removal with the column.
    agent_ids
        .first()
        .and_then(|id| Uuid::parse_str(id).ok())
        .unwrap_or_else(Uuid::new_v4)
}

fn attach_embeddings(task: &mut IngestionTask, action: &DomainAction) -> IngestionResult<()> {
    let embeddings = action
        .data
        .get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| IngestionError::Validation {
            message: "embedding callback without embeddings".to_string(),
        })?;

    // Positional join: the embedder preserves input order.
    for (chunk, entry) in task.chunks.iter_mut().zip(embeddings.iter()) {
        let vector = entry
            .get("embedding")
            .and_then(Value::as_array)
            .or_else(|| entry.as_array())
            .ok_or_else(|| IngestionError::Validation {
                message: "malformed embedding entry".to_string(),
            })?;
        chunk.embedding = Some(
            vector
                .iter()
                .filter_map(Value::as_f64)
                .map(|v| v as f32)
                .collect(),
        );
    }
    Ok(())
}

fn embedding_metadata_from(action: &DomainAction, rag_config: &RagConfig) -> EmbeddingMetadata {
    EmbeddingMetadata {
        embedding_model: action
            .data
            .get("embedding_model")
            .and_then(Value::as_str)
            .unwrap_or(&rag_config.embedding_model)
            .to_string(),
        embedding_dimensions: action
            .data
            .get("embedding_dimensions")
            .and_then(Value::as_u64)
            .unwrap_or(rag_config.embedding_dimensions),
        encoding_format: action
            .data
            .get("encoding_format")
            .and_then(Value::as_str)
            .unwrap_or(&rag_config.encoding_format)
            .to_string(),
    }
}
