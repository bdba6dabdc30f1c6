//! Ingestion HTTP routes.

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::auth::authenticate;
use super::error::ApiError;
use super::state::GatewayState;
use crate::actions::{ActionDispatch, KeyValueStore};
use crate::agents::RagConfig;
use crate::ingestion::{
    DocumentIngestionRequest, IngestionResponse, TaskStatusView, generate_batch_collection_id,
};
use crate::parser::DocumentType;
use crate::relational::TableStore;
use crate::vectordb::{AgentsOperation, VectorStore};

const UPLOAD_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "md"];

/// Builds the `/ws/ingestion/{task_id}` URL from the request headers.
fn websocket_url(headers: &HeaderMap, task_id: Uuid) -> Option<String> {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let ws_scheme = if scheme == "https" { "wss" } else { "ws" };
    Some(format!("{ws_scheme}://{host}/ws/ingestion/{task_id}"))
}

/// `POST /ingest`: admit one document.
#[instrument(skip(state, headers, request), fields(document_name = %request.document_name))]
pub async fn ingest_handler<B, V, T, K>(
    State(state): State<GatewayState<B, V, T, K>>,
    headers: HeaderMap,
    Json(request): Json<DocumentIngestionRequest>,
) -> Result<Json<IngestionResponse>, ApiError>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    let auth = authenticate(&headers, state.auth.as_ref()).await?;

    info!(
        tenant_id = %auth.tenant_id,
        collection_id = ?request.collection_id,
        "ingestion requested"
    );

    let mut response = state
        .ingestion
        .ingest_document(auth.tenant_id, auth.user_id, request)
        .await?;
    response.websocket_url = websocket_url(&headers, response.task_id);
    Ok(Json(response))
}

/// `POST /batch-ingest` body.
#[derive(Debug, Deserialize)]
pub struct BatchIngestRequest {
    /// Documents to admit.
    pub documents: Vec<DocumentIngestionRequest>,
    /// Shared collection for documents lacking one; generated when
    /// absent.
    #[serde(default)]
    pub collection_id: Option<String>,
    /// Batch-level agent access for documents lacking their own.
    #[serde(default)]
    pub agent_ids: Vec<String>,
    /// Fallback RAG config.
    #[serde(default)]
    pub default_rag_config: Option<RagConfig>,
}

/// `POST /batch-ingest` response.
#[derive(Debug, Serialize)]
pub struct BatchIngestResponse {
    /// Batch id.
    pub batch_id: Uuid,
    /// Collection the batch defaulted into.
    pub collection_id: String,
    /// Documents submitted.
    pub total_documents: usize,
    /// Admissions that succeeded.
    pub succeeded: usize,
    /// Admissions that failed.
    pub failed: usize,
    /// Per-document results.
    pub results: Vec<Value>,
    /// Per-document errors.
    pub errors: Vec<Value>,
}

/// `POST /batch-ingest`: admit several documents with shared defaults.
#[instrument(skip(state, headers, batch), fields(documents = batch.documents.len()))]
pub async fn batch_ingest_handler<B, V, T, K>(
    State(state): State<GatewayState<B, V, T, K>>,
    headers: HeaderMap,
    Json(batch): Json<BatchIngestRequest>,
) -> Result<Json<BatchIngestResponse>, ApiError>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    let auth = authenticate(&headers, state.auth.as_ref()).await?;

    let batch_collection_id = batch
        .collection_id
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(generate_batch_collection_id);

    let total_documents = batch.documents.len();
    let mut results = Vec::new();
    let mut errors = Vec::new();

    for (index, mut request) in batch.documents.into_iter().enumerate() {
        if request.rag_config.is_none() {
            request.rag_config = batch.default_rag_config.clone();
        }
        if request.collection_id.is_none() {
            request.collection_id = Some(batch_collection_id.clone());
        }
        if request.agent_ids.is_empty() && !batch.agent_ids.is_empty() {
            request.agent_ids = batch.agent_ids.clone();
        }

        let document_name = request.document_name.clone();
        match state
            .ingestion
            .ingest_document(auth.tenant_id, auth.user_id, request)
            .await
        {
            Ok(mut response) => {
                response.websocket_url = websocket_url(&headers, response.task_id);
                let mut entry = serde_json::to_value(response)
                    .map_err(|e| ApiError::Internal(e.to_string()))?;
                if let Some(map) = entry.as_object_mut() {
                    map.insert("index".to_string(), index.into());
                    map.insert("document_name".to_string(), document_name.into());
                }
                results.push(entry);
            }
            Err(e) => {
                error!(index, error = %e, "batch document admission failed");
                errors.push(serde_json::json!({
                    "index": index,
                    "document_name": document_name,
                    "error": e.to_string(),
                }));
            }
        }
    }

    Ok(Json(BatchIngestResponse {
        batch_id: Uuid::new_v4(),
        collection_id: batch_collection_id,
        total_documents,
        succeeded: results.len(),
        failed: errors.len(),
        results,
        errors,
    }))
}

/// `POST /upload`: spool a multipart file and ingest it.
#[instrument(skip(state, headers, multipart))]
pub async fn upload_handler<B, V, T, K>(
    State(state): State<GatewayState<B, V, T, K>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<IngestionResponse>, ApiError>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    let auth = authenticate(&headers, state.auth.as_ref()).await?;

    let mut file_name: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut collection_id: Option<String> = None;
    let mut agent_ids: Vec<String> = Vec::new();
    let mut rag_config = RagConfig::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("bad multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                file_name = field.file_name().map(str::to_string);
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::Validation(format!("bad file field: {e}")))?
                        .to_vec(),
                );
            }
            "collection_id" => {
                collection_id = Some(read_text_field(field).await?).filter(|c| !c.is_empty());
            }
            "agent_ids" => {
                let raw = read_text_field(field).await?;
                agent_ids = serde_json::from_str(&raw)
                    .map_err(|e| ApiError::Validation(format!("bad agent_ids: {e}")))?;
            }
            "embedding_model" => rag_config.embedding_model = read_text_field(field).await?,
            "chunk_size" => {
                rag_config.chunk_size = parse_numeric_field(field, "chunk_size").await?;
            }
            "chunk_overlap" => {
                rag_config.chunk_overlap = parse_numeric_field(field, "chunk_overlap").await?;
            }
            _ => {}
        }
    }

    let file_name = file_name.ok_or_else(|| ApiError::Validation("file is required".to_string()))?;
    let file_bytes =
        file_bytes.ok_or_else(|| ApiError::Validation("file is required".to_string()))?;

    let extension = file_name
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !UPLOAD_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::Validation("unsupported file type".to_string()));
    }
    let document_type: DocumentType = extension
        .parse()
        .map_err(|_| ApiError::Validation("unsupported file type".to_string()))?;

    let limit = state.settings.max_document_bytes(document_type.as_str());
    if file_bytes.len() as u64 > limit {
        return Err(ApiError::PayloadTooLarge(format!(
            "file too large, max {} bytes",
            limit
        )));
    }

    let spooled = spool_upload(&file_name, &file_bytes).await?;

    let request = DocumentIngestionRequest {
        document_name: file_name,
        document_type,
        content: None,
        file_path: Some(spooled),
        url: None,
        collection_id,
        agent_ids,
        rag_config: Some(rag_config),
        metadata: serde_json::Map::new(),
    };

    let mut response = state
        .ingestion
        .ingest_document(auth.tenant_id, auth.user_id, request)
        .await?;
    response.websocket_url = websocket_url(&headers, response.task_id);
    Ok(Json(response))
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("bad field: {e}")))
}

async fn parse_numeric_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<usize, ApiError> {
    read_text_field(field)
        .await?
        .parse()
        .map_err(|_| ApiError::Validation(format!("{name} must be a number")))
}

async fn spool_upload(file_name: &str, bytes: &[u8]) -> Result<String, ApiError> {
    let dir = std::env::temp_dir().join("ingestion_uploads");
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::Internal(format!("upload spool unavailable: {e}")))?;

    let path = dir.join(format!("{}_{file_name}", Uuid::new_v4()));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("upload spool failed: {e}")))?;
    Ok(path.display().to_string())
}

/// `DELETE /document/{id}` body.
#[derive(Debug, Deserialize)]
pub struct DeleteDocumentRequest {
    /// Collection the document lives in, required for scoping.
    pub collection_id: String,
}

/// `DELETE /document/{id}`: remove a document and its chunks.
#[instrument(skip(state, headers, request), fields(document_id = %document_id))]
pub async fn delete_document_handler<B, V, T, K>(
    State(state): State<GatewayState<B, V, T, K>>,
    Path(document_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<DeleteDocumentRequest>,
) -> Result<Json<Value>, ApiError>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    let auth = authenticate(&headers, state.auth.as_ref()).await?;

    let result = state
        .ingestion
        .delete_document(auth.tenant_id, document_id, &request.collection_id)
        .await?;
    Ok(Json(result))
}

/// `PUT /document/{id}/agents` body.
#[derive(Debug, Deserialize)]
pub struct UpdateAgentsRequest {
    /// Agents to apply.
    pub agent_ids: Vec<String>,
    /// `set`, `add`, or `remove`; defaults to `set`.
    #[serde(default)]
    pub operation: Option<String>,
}

/// `PUT /document/{id}/agents`: change a document's agent access.
#[instrument(skip(state, headers, request), fields(document_id = %document_id))]
pub async fn update_agents_handler<B, V, T, K>(
    State(state): State<GatewayState<B, V, T, K>>,
    Path(document_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<UpdateAgentsRequest>,
) -> Result<Json<Value>, ApiError>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    let auth = authenticate(&headers, state.auth.as_ref()).await?;

    let operation: AgentsOperation = request
        .operation
        .as_deref()
        .unwrap_or("set")
        .parse()
        .map_err(ApiError::Validation)?;

    let result = state
        .ingestion
        .update_document_agents(auth.tenant_id, document_id, &request.agent_ids, operation)
        .await?;
    Ok(Json(result))
}

/// `GET /status/{task_id}`: owner-checked task status.
#[instrument(skip(state, headers), fields(task_id = %task_id))]
pub async fn status_handler<B, V, T, K>(
    State(state): State<GatewayState<B, V, T, K>>,
    Path(task_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<TaskStatusView>, ApiError>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    let auth = authenticate(&headers, state.auth.as_ref()).await?;

    state
        .ingestion
        .get_task_status(task_id, auth.user_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
}

/// `GET /health`: liveness.
pub async fn health_handler<B, V, T, K>(
    State(state): State<GatewayState<B, V, T, K>>,
) -> Json<Value>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    Json(serde_json::json!({
        "status": "ok",
        "service": state.settings.service_name,
        "version": state.settings.service_version,
    }))
}
