use uuid::Uuid;

use super::client::VectorStore;
use super::error::VectorStoreError;
use super::mock::MockVectorIndex;
use super::model::{
    AgentsOperation, EmbeddingMetadata, SearchParams, apply_agents_operation,
};
use crate::parser::{Chunk, DocumentContext};

fn test_metadata() -> EmbeddingMetadata {
    EmbeddingMetadata {
        embedding_model: "text-embedding-3-small".to_string(),
        embedding_dimensions: 4,
        encoding_format: "float".to_string(),
    }
}

fn context(tenant_id: Uuid, collection_id: &str, agent_ids: &[&str]) -> DocumentContext {
    DocumentContext {
        document_id: Uuid::new_v4(),
        tenant_id,
        collection_id: collection_id.to_string(),
        agent_ids: agent_ids.iter().map(|a| a.to_string()).collect(),
    }
}

fn embedded_chunk(context: &DocumentContext, content: &str, index: usize, seed: f32) -> Chunk {
    let mut chunk = Chunk::new(context, content.to_string(), index);
    chunk.embedding = Some(vec![seed, 1.0 - seed, 0.5, 0.25]);
    chunk
}

fn search_params(tenant_id: Uuid, agent_id: Uuid) -> SearchParams {
    SearchParams {
        tenant_id,
        agent_id,
        query_vector: vec![0.9, 0.1, 0.5, 0.25],
        collection_ids: None,
        document_ids: None,
        top_k: 10,
        threshold: 0.0,
    }
}

#[tokio::test]
async fn test_upsert_counts_and_rejects_missing_embeddings() {
    let index = MockVectorIndex::new();
    let tenant = Uuid::new_v4();
    let ctx = context(tenant, "col_a", &[]);

    let with_embedding = embedded_chunk(&ctx, "has vector", 0, 0.9);
    let without_embedding = Chunk::new(&ctx, "no vector".to_string(), 1);
    let missing_id = without_embedding.chunk_id;

    let outcome = index
        .upsert_chunks(
            &[with_embedding, without_embedding],
            tenant,
            "col_a",
            &[],
            &test_metadata(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.stored, 1);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.failed_ids, vec![missing_id]);
    assert_eq!(index.point_count(), 1);
}

#[tokio::test]
async fn test_upsert_is_idempotent_with_later_payload() {
    let index = MockVectorIndex::new();
    let tenant = Uuid::new_v4();
    let ctx = context(tenant, "col_a", &[]);
    let chunk = embedded_chunk(&ctx, "v1 content", 0, 0.4);

    index
        .upsert_chunks(&[chunk.clone()], tenant, "col_a", &[], &test_metadata())
        .await
        .unwrap();

    let mut updated = chunk.clone();
    updated.content = "v2 content".to_string();
    index
        .upsert_chunks(&[updated], tenant, "col_a", &[], &test_metadata())
        .await
        .unwrap();

    assert_eq!(index.point_count(), 1);
    let payload = index.payload_of(chunk.chunk_id).unwrap();
    assert_eq!(payload["content"], "v2 content");
}

#[tokio::test]
async fn test_payload_carries_full_hierarchy() {
    let index = MockVectorIndex::new();
    let tenant = Uuid::new_v4();
    let ctx = context(tenant, "col_a", &["agent-x"]);
    let chunk = embedded_chunk(&ctx, "hello", 0, 0.5);

    index
        .upsert_chunks(
            &[chunk.clone()],
            tenant,
            "col_a",
            &["agent-x".to_string()],
            &test_metadata(),
        )
        .await
        .unwrap();

    let payload = index.payload_of(chunk.chunk_id).unwrap();
    assert_eq!(payload["tenant_id"], tenant.to_string());
    assert_eq!(payload["collection_id"], "col_a");
    assert_eq!(payload["agent_ids"][0], "agent-x");
    assert_eq!(payload["document_id"], ctx.document_id.to_string());
    assert_eq!(payload["chunk_id"], chunk.chunk_id.to_string());
    assert_eq!(payload["embedding_model"], "text-embedding-3-small");
    assert_eq!(payload["encoding_format"], "float");
}

#[tokio::test]
async fn test_delete_is_scoped_by_all_three_keys() {
    let index = MockVectorIndex::new();
    let tenant = Uuid::new_v4();
    let ctx_a = context(tenant, "col_a", &[]);
    let ctx_b = context(tenant, "col_b", &[]);

    index
        .upsert_chunks(
            &[
                embedded_chunk(&ctx_a, "doc1 c0", 0, 0.1),
                embedded_chunk(&ctx_a, "doc1 c1", 1, 0.2),
            ],
            tenant,
            "col_a",
            &[],
            &test_metadata(),
        )
        .await
        .unwrap();
    index
        .upsert_chunks(
            &[embedded_chunk(&ctx_b, "doc2 c0", 0, 0.3)],
            tenant,
            "col_b",
            &[],
            &test_metadata(),
        )
        .await
        .unwrap();

    index
        .delete_document(tenant, "col_a", ctx_a.document_id)
        .await
        .unwrap();

    assert_eq!(index.point_count(), 1);
    assert_eq!(
        index.points_matching(&[("document_id", &ctx_b.document_id.to_string())]),
        1
    );
}

#[tokio::test]
async fn test_search_filters_tenant_and_agent_membership() {
    let index = MockVectorIndex::new();
    let tenant = Uuid::new_v4();
    let other_tenant = Uuid::new_v4();
    let agent = Uuid::new_v4();

    let visible = context(tenant, "col_a", &[&agent.to_string()]);
    let other_agent = context(tenant, "col_a", &["someone-else"]);
    let foreign = context(other_tenant, "col_a", &[&agent.to_string()]);

    for ctx in [&visible, &other_agent, &foreign] {
        index
            .upsert_chunks(
                &[embedded_chunk(ctx, "text", 0, 0.8)],
                ctx.tenant_id,
                &ctx.collection_id,
                &ctx.agent_ids,
                &test_metadata(),
            )
            .await
            .unwrap();
    }

    let hits = index.search(search_params(tenant, agent)).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].payload["document_id"], visible.document_id.to_string());
}

#[tokio::test]
async fn test_search_refuses_missing_tenant_or_agent() {
    let index = MockVectorIndex::new();

    let err = index
        .search(search_params(Uuid::nil(), Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, VectorStoreError::MissingTenant));

    let err = index
        .search(search_params(Uuid::new_v4(), Uuid::nil()))
        .await
        .unwrap_err();
    assert!(matches!(err, VectorStoreError::MissingTenant));
}

#[tokio::test]
async fn test_search_orders_by_score_and_truncates() {
    let index = MockVectorIndex::new();
    let tenant = Uuid::new_v4();
    let agent = Uuid::new_v4();
    let ctx = context(tenant, "col_a", &[&agent.to_string()]);

    let chunks: Vec<Chunk> = (0..5)
        .map(|i| embedded_chunk(&ctx, &format!("chunk {i}"), i, i as f32 / 5.0))
        .collect();
    index
        .upsert_chunks(&chunks, tenant, "col_a", &ctx.agent_ids, &test_metadata())
        .await
        .unwrap();

    let mut params = search_params(tenant, agent);
    params.top_k = 3;
    let hits = index.search(params).await.unwrap();

    assert_eq!(hits.len(), 3);
    assert!(hits[0].score >= hits[1].score);
    assert!(hits[1].score >= hits[2].score);
}

#[tokio::test]
async fn test_agents_update_set_then_set_is_last_write() {
    let index = MockVectorIndex::new();
    let tenant = Uuid::new_v4();
    let ctx = context(tenant, "col_a", &["x", "y"]);
    let chunk = embedded_chunk(&ctx, "text", 0, 0.5);

    index
        .upsert_chunks(&[chunk.clone()], tenant, "col_a", &ctx.agent_ids, &test_metadata())
        .await
        .unwrap();

    index
        .update_chunk_agents(
            tenant,
            ctx.document_id,
            &["a".to_string()],
            AgentsOperation::Set,
        )
        .await
        .unwrap();
    index
        .update_chunk_agents(
            tenant,
            ctx.document_id,
            &["b".to_string()],
            AgentsOperation::Set,
        )
        .await
        .unwrap();

    let payload = index.payload_of(chunk.chunk_id).unwrap();
    assert_eq!(payload["agent_ids"], serde_json::json!(["b"]));
}

#[tokio::test]
async fn test_agents_update_add_then_remove_is_identity() {
    let index = MockVectorIndex::new();
    let tenant = Uuid::new_v4();
    let ctx = context(tenant, "col_a", &["x", "y"]);
    let chunk = embedded_chunk(&ctx, "text", 0, 0.5);

    index
        .upsert_chunks(&[chunk.clone()], tenant, "col_a", &ctx.agent_ids, &test_metadata())
        .await
        .unwrap();

    let z = vec!["z".to_string()];
    index
        .update_chunk_agents(tenant, ctx.document_id, &z, AgentsOperation::Add)
        .await
        .unwrap();
    index
        .update_chunk_agents(tenant, ctx.document_id, &z, AgentsOperation::Remove)
        .await
        .unwrap();

    let payload = index.payload_of(chunk.chunk_id).unwrap();
    assert_eq!(payload["agent_ids"], serde_json::json!(["x", "y"]));
}

#[test]
fn test_apply_agents_operation_laws() {
    let current = vec!["x".to_string(), "y".to_string()];

    // set replaces wholesale
    assert_eq!(
        apply_agents_operation(current.clone(), &["z".to_string()], AgentsOperation::Set),
        vec!["z".to_string()]
    );

    // add unions without duplicates, preserving order
    let added = apply_agents_operation(
        current.clone(),
        &["y".to_string(), "z".to_string()],
        AgentsOperation::Add,
    );
    assert_eq!(added, vec!["x".to_string(), "y".to_string(), "z".to_string()]);

    // remove subtracts
    let removed = apply_agents_operation(added, &["x".to_string()], AgentsOperation::Remove);
    assert_eq!(removed, vec!["y".to_string(), "z".to_string()]);
}

#[test]
fn test_agents_operation_parses_from_wire() {
    assert_eq!("set".parse::<AgentsOperation>().unwrap(), AgentsOperation::Set);
    assert_eq!("add".parse::<AgentsOperation>().unwrap(), AgentsOperation::Add);
    assert_eq!(
        "remove".parse::<AgentsOperation>().unwrap(),
        AgentsOperation::Remove
    );
    assert!("merge".parse::<AgentsOperation>().is_err());
}
