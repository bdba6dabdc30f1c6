use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use uuid::Uuid;

use super::error::IngestionError;
use super::service::{DocumentIngestionRequest, IngestionService};
use super::task::{IngestionStatus, normalize_agent_ids};
use crate::actions::{EMBEDDING_BATCH_PROCESS, MockActionBus, MockKv};
use crate::agents::RagConfig;
use crate::config::Settings;
use crate::fanout::{FanoutHub, Frame};
use crate::parser::DocumentType;
use crate::relational::{MockTableStore, TABLE_DOCUMENTS_RAG};
use crate::vectordb::{AgentsOperation, MockVectorIndex};

type TestService = IngestionService<MockActionBus, MockVectorIndex, MockTableStore, MockKv>;

struct Fixture {
    service: Arc<TestService>,
    bus: Arc<MockActionBus>,
    vector: Arc<MockVectorIndex>,
    store: Arc<MockTableStore>,
    fanout: Arc<FanoutHub>,
}

fn fixture() -> Fixture {
    let bus = Arc::new(MockActionBus::new());
    let vector = Arc::new(MockVectorIndex::new());
    let store = Arc::new(MockTableStore::new());
    let kv = Arc::new(MockKv::new());
    let fanout = Arc::new(FanoutHub::new());
    let settings = Arc::new(Settings::default());

    let service = Arc::new(IngestionService::new(
        Arc::clone(&bus),
        Arc::clone(&vector),
        Arc::clone(&store),
        kv,
        Arc::clone(&fanout),
        settings,
    ));

    Fixture {
        service,
        bus,
        vector,
        store,
        fanout,
    }
}

fn inline_request(content: &str) -> DocumentIngestionRequest {
    DocumentIngestionRequest {
        document_name: "note.txt".to_string(),
        document_type: DocumentType::Txt,
        content: Some(content.to_string()),
        file_path: None,
        url: None,
        collection_id: None,
        agent_ids: vec![],
        rag_config: Some(RagConfig {
            chunk_size: 64,
            chunk_overlap: 0,
            ..Default::default()
        }),
        metadata: serde_json::Map::new(),
    }
}

async fn wait_for_embed_request(bus: &MockActionBus) -> crate::actions::DomainAction {
    for _ in 0..100 {
        if let Some(action) = bus.sent_of_type(EMBEDDING_BATCH_PROCESS).pop() {
            return action;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("embed request never dispatched");
}

fn embeddings_reply(
    embed_action: &crate::actions::DomainAction,
    count: usize,
) -> crate::actions::DomainAction {
    let embeddings: Vec<Value> = (0..count)
        .map(|i| json!({"embedding": vec![0.1_f32 * (i as f32 + 1.0); 4]}))
        .collect();
    embed_action
        .reply(
            "embedding-service",
            json!({
                "embeddings": embeddings,
                "embedding_model": "text-embedding-3-small",
                "embedding_dimensions": 1536,
                "encoding_format": "float",
            }),
        )
        .expect("embed request must expect a callback")
}

#[test]
fn test_normalize_agent_ids_artifacts() {
    assert!(normalize_agent_ids(vec!["[]".to_string()]).is_empty());
    assert!(normalize_agent_ids(vec!["".to_string()]).is_empty());
    assert!(normalize_agent_ids(vec!["null".to_string()]).is_empty());
    assert_eq!(
        normalize_agent_ids(vec![r#"["a", "b"]"#.to_string()]),
        vec!["a".to_string(), "b".to_string()]
    );
    // Already-normal lists pass through untouched.
    assert_eq!(
        normalize_agent_ids(vec!["a".to_string(), "b".to_string()]),
        vec!["a".to_string(), "b".to_string()]
    );
}

#[tokio::test]
async fn test_admission_generates_ids_and_collection() {
    let fx = fixture();
    let tenant = Uuid::new_v4();
    let user = Uuid::new_v4();

    let response = fx
        .service
        .ingest_document(tenant, user, inline_request("Hello world. Second sentence."))
        .await
        .unwrap();

    assert_eq!(response.status, IngestionStatus::Processing);
    assert!(response.collection_id.starts_with("col_"));
    assert_eq!(response.collection_id.len(), "col_".len() + 8);
    assert!(response.agent_ids.is_empty());

    let status = fx
        .service
        .get_task_status(response.task_id, user)
        .await
        .expect("owner sees the task");
    assert_eq!(status.status, IngestionStatus::Processing);

    // A foreign user sees nothing.
    assert!(fx
        .service
        .get_task_status(response.task_id, Uuid::new_v4())
        .await
        .is_none());
}

#[tokio::test]
async fn test_admission_rejects_missing_source() {
    let fx = fixture();
    let mut request = inline_request("x");
    request.content = None;

    let err = fx
        .service
        .ingest_document(Uuid::new_v4(), Uuid::new_v4(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::Validation { .. }));
}

#[tokio::test]
async fn test_happy_path_ingest_completes() {
    let fx = fixture();
    let tenant = Uuid::new_v4();
    let user = Uuid::new_v4();

    let response = fx
        .service
        .ingest_document(tenant, user, inline_request("Hello world. Second sentence."))
        .await
        .unwrap();
    let mut progress = fx.fanout.subscribe_task(response.task_id);

    let embed_action = wait_for_embed_request(&fx.bus).await;
    assert_eq!(embed_action.task_id, Some(response.task_id));
    assert_eq!(
        embed_action.callback_action_type.as_deref(),
        Some("ingestion.embedding_callback")
    );
    assert_eq!(embed_action.data["model"], "text-embedding-3-small");
    assert_eq!(embed_action.data["texts"].as_array().unwrap().len(), 1);

    let reply = embeddings_reply(&embed_action, 1);
    fx.service.handle_embedding_callback(&reply).await.unwrap();

    // Exactly one point under the full hierarchy.
    assert_eq!(fx.vector.point_count(), 1);
    assert_eq!(
        fx.vector.points_matching(&[
            ("tenant_id", &tenant.to_string()),
            ("collection_id", &response.collection_id),
            ("document_id", &response.document_id.to_string()),
        ]),
        1
    );

    // One documents_rag row with the embedding contract recorded.
    let rows = fx.store.rows(TABLE_DOCUMENTS_RAG);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["embedding_model"], "text-embedding-3-small");
    assert_eq!(rows[0]["embedding_dimensions"], 1536);
    assert_eq!(rows[0]["encoding_format"], "float");
    assert_eq!(rows[0]["status"], "completed");
    assert_eq!(rows[0]["total_chunks"], 1);
    assert_eq!(rows[0]["processed_chunks"], 1);
    assert_eq!(rows[0]["metadata"]["agent_ids"], json!([]));
    // Transitional scalar still populated.
    assert!(rows[0]["agent_id"].as_str().is_some());

    // Final frame: COMPLETED at 100 with matching counters.
    let mut last = None;
    while let Ok(frame) = progress.try_recv() {
        last = Some(frame);
    }
    let Some(Frame::Progress(final_frame)) = last else {
        panic!("expected a final progress frame");
    };
    assert_eq!(final_frame.status, "completed");
    assert_eq!(final_frame.percentage, 100.0);
    assert_eq!(final_frame.total_chunks, Some(1));
    assert_eq!(final_frame.processed_chunks, Some(1));

    let status = fx.service.get_task_status(response.task_id, user).await.unwrap();
    assert_eq!(status.status, IngestionStatus::Completed);
    assert!(status.processed_chunks <= status.total_chunks);
}

#[tokio::test]
async fn test_collection_model_mismatch_fails_admission() {
    let fx = fixture();
    let tenant = Uuid::new_v4();
    fx.store.seed(
        TABLE_DOCUMENTS_RAG,
        json!({
            "tenant_id": tenant.to_string(),
            "collection_id": "col_y",
            "embedding_model": "model-a",
            "embedding_dimensions": 1536,
        }),
    );

    let mut request = inline_request("content");
    request.collection_id = Some("col_y".to_string());
    request.rag_config = Some(RagConfig {
        embedding_model: "model-b".to_string(),
        ..Default::default()
    });

    let err = fx
        .service
        .ingest_document(tenant, Uuid::new_v4(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::CollectionModelMismatch { .. }));

    // No task, no embed request, no vectors.
    assert!(fx.bus.sent_of_type(EMBEDDING_BATCH_PROCESS).is_empty());
    assert_eq!(fx.vector.point_count(), 0);
}

#[tokio::test]
async fn test_same_model_reingest_is_admitted() {
    let fx = fixture();
    let tenant = Uuid::new_v4();
    fx.store.seed(
        TABLE_DOCUMENTS_RAG,
        json!({
            "tenant_id": tenant.to_string(),
            "collection_id": "col_y",
            "embedding_model": "text-embedding-3-small",
            "embedding_dimensions": 1536,
        }),
    );

    let mut request = inline_request("more content");
    request.collection_id = Some("col_y".to_string());

    fx.service
        .ingest_document(tenant, Uuid::new_v4(), request)
        .await
        .expect("same model must be admitted");
}

#[tokio::test]
async fn test_embed_dispatch_failure_fails_task() {
    let fx = fixture();
    fx.bus.fail_sends(true);
    let user = Uuid::new_v4();

    let response = fx
        .service
        .ingest_document(Uuid::new_v4(), user, inline_request("content here"))
        .await
        .unwrap();

    // The pipeline notices the send failure and fails the task.
    let mut status = None;
    for _ in 0..100 {
        status = fx.service.get_task_status(response.task_id, user).await;
        if status.as_ref().is_some_and(|s| s.status == IngestionStatus::Failed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let status = status.expect("task must exist");
    assert_eq!(status.status, IngestionStatus::Failed);
    assert!(status.error.is_some());
}

#[tokio::test]
async fn test_callback_for_unknown_task_is_dropped() {
    let fx = fixture();

    let orphan = crate::actions::DomainAction::new(
        "ingestion.embedding_callback",
        Uuid::new_v4(),
        "embedding-service",
    )
    .with_task(Uuid::new_v4())
    .with_data(json!({"embeddings": []}));

    let err = fx.service.handle_embedding_callback(&orphan).await.unwrap_err();
    assert!(matches!(err, IngestionError::TaskNotFound { .. }));
    assert_eq!(fx.vector.point_count(), 0);
}

#[tokio::test]
async fn test_embedder_failure_callback_fails_task() {
    let fx = fixture();
    let user = Uuid::new_v4();

    let response = fx
        .service
        .ingest_document(Uuid::new_v4(), user, inline_request("content"))
        .await
        .unwrap();
    let embed_action = wait_for_embed_request(&fx.bus).await;

    let reply = embed_action
        .reply(
            "embedding-service",
            json!({"error": "rate limited", "error_type": "service_unavailable"}),
        )
        .unwrap();
    let _ = fx.service.handle_embedding_callback(&reply).await;

    let status = fx.service.get_task_status(response.task_id, user).await.unwrap();
    assert_eq!(status.status, IngestionStatus::Failed);
    assert_eq!(status.error.as_deref(), Some("rate limited"));
    assert_eq!(fx.vector.point_count(), 0);
}

#[tokio::test]
async fn test_delete_document_removes_vectors_and_row() {
    let fx = fixture();
    let tenant = Uuid::new_v4();
    let user = Uuid::new_v4();

    let response = fx
        .service
        .ingest_document(tenant, user, inline_request("to be deleted"))
        .await
        .unwrap();
    let embed_action = wait_for_embed_request(&fx.bus).await;
    fx.service
        .handle_embedding_callback(&embeddings_reply(&embed_action, 1))
        .await
        .unwrap();
    assert_eq!(fx.vector.point_count(), 1);

    fx.service
        .delete_document(tenant, response.document_id, &response.collection_id)
        .await
        .unwrap();

    assert_eq!(fx.vector.point_count(), 0);
    assert!(fx.store.rows(TABLE_DOCUMENTS_RAG).is_empty());
}

#[tokio::test]
async fn test_agents_update_mirrors_vector_state_in_metadata() {
    let fx = fixture();
    let tenant = Uuid::new_v4();
    let user = Uuid::new_v4();

    let mut request = inline_request("shared document");
    request.agent_ids = vec!["agent-x".to_string(), "agent-y".to_string()];
    let response = fx.service.ingest_document(tenant, user, request).await.unwrap();
    let embed_action = wait_for_embed_request(&fx.bus).await;
    fx.service
        .handle_embedding_callback(&embeddings_reply(&embed_action, 1))
        .await
        .unwrap();

    // add z → {x, y, z}
    fx.service
        .update_document_agents(
            tenant,
            response.document_id,
            &["agent-z".to_string()],
            AgentsOperation::Add,
        )
        .await
        .unwrap();
    let rows = fx.store.rows(TABLE_DOCUMENTS_RAG);
    assert_eq!(
        rows[0]["metadata"]["agent_ids"],
        json!(["agent-x", "agent-y", "agent-z"])
    );

    // remove x → {y, z}, vector payloads agree
    fx.service
        .update_document_agents(
            tenant,
            response.document_id,
            &["agent-x".to_string()],
            AgentsOperation::Remove,
        )
        .await
        .unwrap();
    let rows = fx.store.rows(TABLE_DOCUMENTS_RAG);
    assert_eq!(rows[0]["metadata"]["agent_ids"], json!(["agent-y", "agent-z"]));
    assert_eq!(
        fx.vector.points_matching(&[("agent_ids", "agent-y")]),
        1
    );
    assert_eq!(
        fx.vector.points_matching(&[("agent_ids", "agent-x")]),
        0
    );
}

#[tokio::test]
async fn test_agents_update_unknown_document_is_not_found() {
    let fx = fixture();

    let err = fx
        .service
        .update_document_agents(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &["agent-a".to_string()],
            AgentsOperation::Set,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IngestionError::DocumentNotFound { .. }));
}
