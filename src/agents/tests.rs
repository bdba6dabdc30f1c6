use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use super::cache::ConfigCache;
use super::models::{AgentConfig, DEFAULT_SYSTEM_PROMPT};
use crate::actions::MockKv;
use crate::actions::kv::KeyValueStore;
use crate::relational::{MockTableStore, TABLE_AGENTS_WITH_PROMPT};

fn camel_row(agent_id: Uuid, tenant_id: Uuid) -> serde_json::Value {
    json!({
        "id": agent_id.to_string(),
        "userId": tenant_id.to_string(),
        "name": "support-bot",
        "systemPrompt": "You answer support tickets.",
        "queryConfig": {"model": "gpt-4o-mini", "temperature": 0.2},
        "ragConfig": {"collection_ids": ["docs"], "top_k": 3},
        "executionConfig": {"max_iterations": 2},
        "createdAt": "2025-03-01T10:00:00Z",
        "updatedAt": "2025-03-02T10:00:00Z"
    })
}

fn snake_row(agent_id: Uuid, tenant_id: Uuid) -> serde_json::Value {
    json!({
        "id": agent_id.to_string(),
        "user_id": tenant_id.to_string(),
        "name": "support-bot",
        "system_prompt": "You answer support tickets.",
        "query_config": {"model": "gpt-4o-mini", "temperature": 0.2},
        "rag_config": {"collection_ids": ["docs"], "top_k": 3},
        "execution_config": {"max_iterations": 2},
        "created_at": "2025-03-01T10:00:00+00:00",
        "updated_at": "2025-03-02T10:00:00+00:00"
    })
}

#[test]
fn test_normalization_round_trip_camel_vs_snake() {
    let agent_id = Uuid::new_v4();
    let tenant_id = Uuid::new_v4();

    let from_camel = AgentConfig::from_row(&camel_row(agent_id, tenant_id)).unwrap();
    let from_snake = AgentConfig::from_row(&snake_row(agent_id, tenant_id)).unwrap();

    assert_eq!(from_camel, from_snake);
    assert_eq!(from_camel.query_config.model, "gpt-4o-mini");
    assert_eq!(
        from_camel.query_config.system_prompt_template,
        "You answer support tickets."
    );
}

#[test]
fn test_normalized_config_guarantees() {
    let agent_id = Uuid::new_v4();
    let tenant_id = Uuid::new_v4();
    // No prompt anywhere, empty collections, unknown keys sprinkled in.
    let row = json!({
        "id": agent_id.to_string(),
        "user_id": tenant_id.to_string(),
        "name": "bare-agent",
        "query_config": {"model": "m", "internal_flag": true},
        "rag_config": {"collection_ids": [], "encoding_format": ""},
        "created_at": "2025-03-01T10:00:00Z",
        "updated_at": "2025-03-01T10:00:00Z"
    });

    let config = AgentConfig::from_row(&row).unwrap();

    assert_eq!(config.query_config.system_prompt_template, DEFAULT_SYSTEM_PROMPT);
    assert_eq!(config.rag_config.collection_ids, vec!["default".to_string()]);
    assert_eq!(config.rag_config.encoding_format, "float");
}

#[test]
fn test_from_row_rejects_missing_identity() {
    let row = json!({"name": "orphan"});
    assert!(AgentConfig::from_row(&row).is_err());
}

fn seeded_cache(
    agent_id: Uuid,
    tenant_id: Uuid,
) -> (ConfigCache<MockKv, MockTableStore>, Arc<MockKv>, Arc<MockTableStore>) {
    let kv = Arc::new(MockKv::new());
    let store = Arc::new(MockTableStore::new());
    store.seed(TABLE_AGENTS_WITH_PROMPT, camel_row(agent_id, tenant_id));
    let cache = ConfigCache::new(Arc::clone(&kv), Arc::clone(&store), 600);
    (cache, kv, store)
}

#[tokio::test]
async fn test_lookup_populates_both_levels() {
    let agent_id = Uuid::new_v4();
    let (cache, kv, _store) = seeded_cache(agent_id, Uuid::new_v4());

    let config = cache.resolve(agent_id).await.unwrap();
    assert_eq!(config.agent_name, "support-bot");

    // L2 got populated with the configured TTL.
    assert_eq!(kv.ttl_of(&format!("agent_config:{agent_id}")), Some(600));
}

#[tokio::test]
async fn test_second_lookup_skips_the_store() {
    let agent_id = Uuid::new_v4();
    let (cache, _kv, store) = seeded_cache(agent_id, Uuid::new_v4());

    cache.resolve(agent_id).await.unwrap();

    // Break the store; the cached copy must still serve.
    store.fail_requests(true);
    let config = cache.resolve(agent_id).await.unwrap();
    assert_eq!(config.agent_name, "support-bot");
}

#[tokio::test]
async fn test_l2_serves_after_l1_invalidation_elsewhere() {
    let agent_id = Uuid::new_v4();
    let tenant_id = Uuid::new_v4();
    let kv = Arc::new(MockKv::new());
    let store = Arc::new(MockTableStore::new());
    store.seed(TABLE_AGENTS_WITH_PROMPT, camel_row(agent_id, tenant_id));

    // First process fills L2.
    let warm = ConfigCache::new(Arc::clone(&kv), Arc::clone(&store), 600);
    warm.resolve(agent_id).await.unwrap();

    // Second process has a cold L1 and a broken store: L2 must carry it.
    store.fail_requests(true);
    let cold = ConfigCache::new(Arc::clone(&kv), Arc::clone(&store), 600);
    let config = cold.resolve(agent_id).await.unwrap();
    assert_eq!(config.agent_id, agent_id);
}

#[tokio::test]
async fn test_invalidate_clears_both_levels() {
    let agent_id = Uuid::new_v4();
    let (cache, kv, store) = seeded_cache(agent_id, Uuid::new_v4());

    cache.resolve(agent_id).await.unwrap();
    cache.invalidate(agent_id).await;

    assert!(kv
        .get(&format!("agent_config:{agent_id}"))
        .await
        .unwrap()
        .is_none());

    // Next lookup must hit the store again.
    store.fail_requests(true);
    assert!(cache.resolve(agent_id).await.is_err());
}

#[tokio::test]
async fn test_failure_serves_default_configs() {
    let kv = Arc::new(MockKv::new());
    let store = Arc::new(MockTableStore::new());
    store.fail_requests(true);
    let cache = ConfigCache::new(kv, store, 600);

    let (_execution, query, rag) = cache.get_agent_configs(Uuid::new_v4()).await;

    // Survival mode, with the cache guarantees intact.
    assert!(!query.system_prompt_template.is_empty());
    assert_eq!(rag.collection_ids, vec!["default".to_string()]);
}

#[tokio::test]
async fn test_unknown_agent_serves_default_configs() {
    let kv = Arc::new(MockKv::new());
    let store = Arc::new(MockTableStore::new());
    let cache = ConfigCache::new(kv, store, 600);

    let (_execution, query, _rag) = cache.get_agent_configs(Uuid::new_v4()).await;
    assert_eq!(query.system_prompt_template, DEFAULT_SYSTEM_PROMPT);
}
