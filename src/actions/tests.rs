use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use super::bus::ActionDispatch;
use super::error::ActionBusError;
use super::kv::KeyValueStore;
use super::mock::{MockActionBus, MockKv};
use super::model::{DomainAction, EXECUTION_CHAT_SIMPLE, queue_for, reply_queue_for};

fn sample_action() -> DomainAction {
    DomainAction::new(EXECUTION_CHAT_SIMPLE, Uuid::new_v4(), "orchestrator-service")
        .with_session(Uuid::new_v4())
        .with_task(Uuid::new_v4())
        .with_data(json!({"message": "hello"}))
}

#[test]
fn test_queue_names() {
    assert_eq!(
        queue_for("ingestion.document.process"),
        "actions:ingestion.document.process"
    );

    let id = Uuid::new_v4();
    assert_eq!(reply_queue_for(id), format!("actions:replies:{id}"));
}

#[test]
fn test_envelope_round_trip() {
    let action = sample_action();
    let wire = serde_json::to_string(&action).expect("serialize");
    let back: DomainAction = serde_json::from_str(&wire).expect("deserialize");

    assert_eq!(back.action_id, action.action_id);
    assert_eq!(back.action_type, action.action_type);
    assert_eq!(back.tenant_id, action.tenant_id);
    assert_eq!(back.task_id, action.task_id);
    assert_eq!(back.data["message"], "hello");
}

#[test]
fn test_unknown_fields_preserved() {
    let mut wire = serde_json::to_value(sample_action()).expect("serialize");
    wire.as_object_mut()
        .unwrap()
        .insert("future_field".to_string(), json!({"nested": 1}));

    let back: DomainAction = serde_json::from_value(wire).expect("deserialize");
    assert_eq!(back.extra["future_field"]["nested"], 1);

    // And they survive re-serialization for the next hop.
    let rewire = serde_json::to_value(&back).expect("serialize");
    assert_eq!(rewire["future_field"]["nested"], 1);
}

#[test]
fn test_reply_carries_task_and_callback_type() {
    let action = sample_action().with_callback("orchestrator.chat.response");

    let reply = action
        .reply("execution-service", json!({"response": "hi"}))
        .expect("request/response action must build a reply");

    assert_eq!(reply.action_type, "orchestrator.chat.response");
    assert_eq!(reply.task_id, action.task_id);
    assert_eq!(reply.session_id, action.session_id);
    assert_eq!(reply.origin_service, "execution-service");
    assert!(reply.callback_action_type.is_none());
}

#[test]
fn test_fire_and_forget_action_has_no_reply() {
    let action = sample_action();
    assert!(!action.expects_callback());
    assert!(action.reply("execution-service", json!({})).is_none());
}

#[test]
fn test_non_object_data_is_wrapped() {
    let action = sample_action().with_data(json!("bare string"));
    assert_eq!(action.data["value"], "bare string");
}

#[tokio::test]
async fn test_mock_bus_records_sends() {
    let bus = MockActionBus::new();

    bus.send_fire_and_forget(sample_action()).await.unwrap();
    bus.send_with_callback(sample_action(), "orchestrator.chat.response")
        .await
        .unwrap();

    let sent = bus.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].callback_action_type.is_none());
    assert_eq!(
        sent[1].callback_action_type.as_deref(),
        Some("orchestrator.chat.response")
    );
}

#[tokio::test]
async fn test_mock_bus_fire_and_forget_swallows_failures() {
    let bus = MockActionBus::new();
    bus.fail_sends(true);

    // Swallowed: the contract is log-and-drop.
    bus.send_fire_and_forget(sample_action()).await.unwrap();

    // Surfaced: the orchestrator needs to fail its task.
    let err = bus
        .send_with_callback(sample_action(), "ingestion.embedding_callback")
        .await
        .unwrap_err();
    assert!(matches!(err, ActionBusError::SendFailed { .. }));
}

#[tokio::test]
async fn test_mock_bus_send_and_wait_times_out_without_reply() {
    let bus = MockActionBus::new();
    let action = sample_action();
    let action_id = action.action_id;

    let err = bus
        .send_and_wait(action, Duration::from_secs(2))
        .await
        .unwrap_err();

    match err {
        ActionBusError::Timeout {
            action_id: id,
            timeout_secs,
        } => {
            assert_eq!(id, action_id);
            assert_eq!(timeout_secs, 2);
        }
        other => panic!("expected timeout, got {other}"),
    }
}

#[tokio::test]
async fn test_mock_bus_send_and_wait_returns_scripted_reply() {
    let bus = MockActionBus::new();
    let reply = sample_action();
    let reply_id = reply.action_id;
    bus.script_reply(reply);

    let got = bus
        .send_and_wait(sample_action(), Duration::from_secs(2))
        .await
        .expect("scripted reply");
    assert_eq!(got.action_id, reply_id);
}

#[tokio::test]
async fn test_mock_kv_ttl_recorded() {
    let kv = MockKv::new();

    kv.set_with_ttl("ingestion:task:abc", "{}", 3600).await.unwrap();
    assert_eq!(kv.ttl_of("ingestion:task:abc"), Some(3600));
    assert_eq!(
        kv.get("ingestion:task:abc").await.unwrap().as_deref(),
        Some("{}")
    );

    kv.delete("ingestion:task:abc").await.unwrap();
    assert!(kv.get("ingestion:task:abc").await.unwrap().is_none());
}
