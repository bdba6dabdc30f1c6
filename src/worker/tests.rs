use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use uuid::Uuid;

use super::error::{HandlerError, HandlerResult};
use super::registry::{ActionHandler, HandlerRegistry};
use super::runtime::{process_action, validate_action};
use crate::actions::{DomainAction, ErrorKind, MockActionBus};

struct EchoHandler;

#[async_trait::async_trait]
impl ActionHandler for EchoHandler {
    async fn handle(&self, action: DomainAction) -> HandlerResult<Option<Value>> {
        Ok(Some(json!({"echo": action.data})))
    }
}

struct FailingHandler;

#[async_trait::async_trait]
impl ActionHandler for FailingHandler {
    async fn handle(&self, _action: DomainAction) -> HandlerResult<Option<Value>> {
        Err(HandlerError::new(ErrorKind::Storage, "disk on fire"))
    }
}

struct CountingHandler {
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ActionHandler for CountingHandler {
    async fn handle(&self, _action: DomainAction) -> HandlerResult<Option<Value>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }
}

fn registry_with(action_type: &str, handler: Arc<dyn ActionHandler>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(action_type, handler);
    registry
}

fn request_action(action_type: &str) -> DomainAction {
    DomainAction::new(action_type, Uuid::new_v4(), "test-service")
        .with_task(Uuid::new_v4())
        .with_callback("test.callback")
        .with_data(json!({"k": "v"}))
}

#[test]
fn test_registry_queues_derived_from_handlers() {
    let mut registry = HandlerRegistry::new();
    registry.register("ingestion.document.process", Arc::new(EchoHandler));
    registry.register("ingestion.document.status", Arc::new(EchoHandler));

    assert_eq!(
        registry.queues(),
        vec![
            "actions:ingestion.document.process".to_string(),
            "actions:ingestion.document.status".to_string(),
        ]
    );
}

#[test]
fn test_validate_rejects_unregistered_type() {
    let registry = HandlerRegistry::new();
    let action = request_action("nobody.owns.this");

    let err = validate_action(&registry, &action).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[test]
fn test_validate_requires_task_id_for_callbacks() {
    let registry = registry_with("test.op", Arc::new(EchoHandler));

    let mut action = request_action("test.op");
    action.task_id = None;
    let err = validate_action(&registry, &action).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let mut action = request_action("test.op");
    action.data.clear();
    let err = validate_action(&registry, &action).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_success_emits_exactly_one_callback() {
    let registry = registry_with("test.op", Arc::new(EchoHandler));
    let bus = MockActionBus::new();
    let action = request_action("test.op");
    let task_id = action.task_id;

    process_action(&registry, &bus, "test-service", action).await;

    let sent = bus.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].action_type, "test.callback");
    assert_eq!(sent[0].task_id, task_id);
    assert_eq!(sent[0].origin_service, "test-service");
}

#[tokio::test]
async fn test_handler_failure_emits_failure_callback() {
    let registry = registry_with("test.op", Arc::new(FailingHandler));
    let bus = MockActionBus::new();

    process_action(&registry, &bus, "test-service", request_action("test.op")).await;

    let sent = bus.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data["error"], "disk on fire");
    assert_eq!(sent[0].data["error_type"], "storage");
}

#[tokio::test]
async fn test_fire_and_forget_failure_is_swallowed() {
    let registry = registry_with("test.op", Arc::new(FailingHandler));
    let bus = MockActionBus::new();

    let action = DomainAction::new("test.op", Uuid::new_v4(), "test-service");
    process_action(&registry, &bus, "test-service", action).await;

    // No failure callback, no poison pill.
    assert!(bus.sent().is_empty());
}

#[tokio::test]
async fn test_fire_and_forget_success_emits_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry_with(
        "test.op",
        Arc::new(CountingHandler {
            calls: Arc::clone(&calls),
        }),
    );
    let bus = MockActionBus::new();

    let action = DomainAction::new("test.op", Uuid::new_v4(), "test-service");
    process_action(&registry, &bus, "test-service", action).await;

    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert!(bus.sent().is_empty());
}

#[tokio::test]
async fn test_dispatch_by_action_type() {
    let mut registry = HandlerRegistry::new();
    registry.register("test.echo", Arc::new(EchoHandler));
    registry.register("test.fail", Arc::new(FailingHandler));

    let result = registry
        .dispatch(request_action("test.echo"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result["echo"]["k"], "v");

    let err = registry
        .dispatch(request_action("test.fail"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Storage);
}
