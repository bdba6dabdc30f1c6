use serde_json::json;
use uuid::Uuid;

use super::{FanoutHub, Frame};

#[tokio::test]
async fn test_progress_reaches_task_subscribers_in_order() {
    let hub = FanoutHub::new();
    let task_id = Uuid::new_v4();
    let mut rx = hub.subscribe_task(task_id);

    hub.send_progress_update(task_id, "processing", "Processing document", 10.0, None, None, None);
    hub.send_progress_update(task_id, "chunking", "Created 3 chunks", 30.0, Some(3), None, None);

    let Frame::Progress(first) = rx.recv().await.unwrap() else {
        panic!("expected progress frame");
    };
    assert_eq!(first.status, "processing");
    assert_eq!(first.percentage, 10.0);

    let Frame::Progress(second) = rx.recv().await.unwrap() else {
        panic!("expected progress frame");
    };
    assert_eq!(second.status, "chunking");
    assert_eq!(second.total_chunks, Some(3));
}

#[tokio::test]
async fn test_frames_scoped_to_their_task() {
    let hub = FanoutHub::new();
    let watched = Uuid::new_v4();
    let other = Uuid::new_v4();
    let mut rx = hub.subscribe_task(watched);

    hub.send_progress_update(other, "processing", "other task", 10.0, None, None, None);
    hub.send_progress_update(watched, "completed", "done", 100.0, Some(1), Some(1), None);

    let Frame::Progress(frame) = rx.recv().await.unwrap() else {
        panic!("expected progress frame");
    };
    assert_eq!(frame.task_id, watched);
    assert_eq!(frame.status, "completed");
}

#[tokio::test]
async fn test_dead_subscribers_are_dropped_silently() {
    let hub = FanoutHub::new();
    let task_id = Uuid::new_v4();

    let rx = hub.subscribe_task(task_id);
    drop(rx);
    assert_eq!(hub.task_subscriber_count(task_id), 1);

    // Delivery notices the closed channel and prunes it.
    hub.send_progress_update(task_id, "processing", "still going", 10.0, None, None, None);
    assert_eq!(hub.task_subscriber_count(task_id), 0);
}

#[tokio::test]
async fn test_session_events_and_errors() {
    let hub = FanoutHub::new();
    let session_id = Uuid::new_v4();
    let task_id = Uuid::new_v4();
    let mut rx = hub.subscribe_session(session_id);

    hub.send_to_session(
        session_id,
        "chat_processing",
        json!({"task_id": task_id.to_string(), "status": "processing", "mode": "simple"}),
        Some(task_id),
    );
    hub.send_error_to_session(session_id, "chat_processing_error", "boom", Some(task_id));

    let Frame::Session(event) = rx.recv().await.unwrap() else {
        panic!("expected session frame");
    };
    assert_eq!(event.message_type, "chat_processing");
    assert_eq!(event.data["mode"], "simple");

    let Frame::Session(error) = rx.recv().await.unwrap() else {
        panic!("expected session frame");
    };
    assert_eq!(error.message_type, "error");
    assert_eq!(error.data["error_type"], "chat_processing_error");
    assert_eq!(error.data["message"], "boom");
}

#[tokio::test]
async fn test_multiple_subscribers_each_get_frames() {
    let hub = FanoutHub::new();
    let task_id = Uuid::new_v4();
    let mut rx_a = hub.subscribe_task(task_id);
    let mut rx_b = hub.subscribe_task(task_id);

    hub.send_progress_update(task_id, "storing", "Storing vectors", 80.0, Some(2), Some(2), None);

    for rx in [&mut rx_a, &mut rx_b] {
        let Frame::Progress(frame) = rx.recv().await.unwrap() else {
            panic!("expected progress frame");
        };
        assert_eq!(frame.status, "storing");
    }
}
