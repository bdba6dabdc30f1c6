use serde_json::json;
use uuid::Uuid;

use super::client::TableStore;
use super::error::TableStoreError;
use super::mock::MockTableStore;
use super::models::{
    TABLE_DOCUMENTS_RAG, TABLE_USER_TENANTS, check_tenant_membership, fetch_tenant_info,
};

#[tokio::test]
async fn test_select_with_equality_filters() {
    let store = MockTableStore::new();
    store.seed(
        TABLE_DOCUMENTS_RAG,
        json!({"tenant_id": "t1", "collection_id": "col_a", "document_id": "d1"}),
    );
    store.seed(
        TABLE_DOCUMENTS_RAG,
        json!({"tenant_id": "t1", "collection_id": "col_b", "document_id": "d2"}),
    );
    store.seed(
        TABLE_DOCUMENTS_RAG,
        json!({"tenant_id": "t2", "collection_id": "col_a", "document_id": "d3"}),
    );

    let rows = store
        .select(
            TABLE_DOCUMENTS_RAG,
            &[("tenant_id", "t1"), ("collection_id", "col_a")],
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["document_id"], "d1");
}

#[tokio::test]
async fn test_update_patches_matching_rows() {
    let store = MockTableStore::new();
    store.seed(
        TABLE_DOCUMENTS_RAG,
        json!({"document_id": "d1", "status": "processing"}),
    );

    let changed = store
        .update(
            TABLE_DOCUMENTS_RAG,
            &[("document_id", "d1")],
            json!({"status": "completed"}),
        )
        .await
        .unwrap();

    assert_eq!(changed, 1);
    assert_eq!(store.rows(TABLE_DOCUMENTS_RAG)[0]["status"], "completed");
}

#[tokio::test]
async fn test_delete_is_filter_scoped() {
    let store = MockTableStore::new();
    store.seed(TABLE_DOCUMENTS_RAG, json!({"document_id": "d1"}));
    store.seed(TABLE_DOCUMENTS_RAG, json!({"document_id": "d2"}));

    store
        .delete(TABLE_DOCUMENTS_RAG, &[("document_id", "d1")])
        .await
        .unwrap();

    let remaining = store.rows(TABLE_DOCUMENTS_RAG);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["document_id"], "d2");
}

#[tokio::test]
async fn test_membership_check() {
    let store = MockTableStore::new();
    let user_id = Uuid::new_v4();
    let tenant_id = Uuid::new_v4();
    store.seed(
        TABLE_USER_TENANTS,
        json!({"user_id": user_id.to_string(), "tenant_id": tenant_id.to_string()}),
    );

    assert!(check_tenant_membership(&store, user_id, tenant_id)
        .await
        .unwrap());
    assert!(!check_tenant_membership(&store, Uuid::new_v4(), tenant_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_tenant_info_absent() {
    let store = MockTableStore::new();
    let info = fetch_tenant_info(&store, Uuid::new_v4()).await.unwrap();
    assert!(info.is_none());
}

#[tokio::test]
async fn test_unavailable_store_surfaces_http_error() {
    let store = MockTableStore::new();
    store.fail_requests(true);

    let err = store
        .select(TABLE_DOCUMENTS_RAG, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, TableStoreError::Http { status: 503, .. }));
}
