//! Progress fan-out to WebSocket subscribers.
//!
//! Clients subscribe by `task_id` (ingestion progress) or by `session_id`
//! (chat events). Delivery is best-effort per subscriber: slow or dead
//! connections are dropped silently. The hub is process-local; callbacks
//! routing back to `origin_service` make each originating process the
//! terminus of its own progress stream.

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// One frame pushed to a subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// Ingestion progress.
    Progress(ProgressFrame),
    /// Session-scoped event (chat lifecycle, errors).
    Session(SessionFrame),
}

/// Progress of one ingestion task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressFrame {
    /// Task being reported.
    pub task_id: Uuid,
    /// Task status name.
    pub status: String,
    /// Human-readable progress message.
    pub message: String,
    /// Completion percentage.
    pub percentage: f32,
    /// Chunks produced by the parser, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u64>,
    /// Chunks stored so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_chunks: Option<u64>,
    /// Failure description on FAILED frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Session-scoped event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFrame {
    /// Event discriminator (`chat_processing`, `chat_response`, `error`).
    pub message_type: String,
    /// Event payload.
    pub data: Value,
    /// Related task, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
}

type Subscriber = mpsc::UnboundedSender<Frame>;

/// Process-local subscription hub.
#[derive(Default)]
pub struct FanoutHub {
    tasks: Mutex<HashMap<Uuid, Vec<Subscriber>>>,
    sessions: Mutex<HashMap<Uuid, Vec<Subscriber>>>,
}

impl std::fmt::Debug for FanoutHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutHub")
            .field("task_subscriptions", &self.tasks.lock().len())
            .field("session_subscriptions", &self.sessions.lock().len())
            .finish()
    }
}

impl FanoutHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to one task's progress frames.
    pub fn subscribe_task(&self, task_id: Uuid) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tasks.lock().entry(task_id).or_default().push(tx);
        debug!(task_id = %task_id, "task subscriber attached");
        rx
    }

    /// Subscribes to one session's events.
    pub fn subscribe_session(&self, session_id: Uuid) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.lock().entry(session_id).or_default().push(tx);
        debug!(session_id = %session_id, "session subscriber attached");
        rx
    }

    /// Emits a progress frame to every subscriber of a task.
    #[allow(clippy::too_many_arguments)]
    pub fn send_progress_update(
        &self,
        task_id: Uuid,
        status: &str,
        message: &str,
        percentage: f32,
        total_chunks: Option<u64>,
        processed_chunks: Option<u64>,
        error: Option<String>,
    ) {
        let frame = Frame::Progress(ProgressFrame {
            task_id,
            status: status.to_string(),
            message: message.to_string(),
            percentage,
            total_chunks,
            processed_chunks,
            error,
        });
        Self::deliver(&self.tasks, task_id, frame);
    }

    /// Emits an event to every subscriber of a session.
    pub fn send_to_session(
        &self,
        session_id: Uuid,
        message_type: &str,
        data: Value,
        task_id: Option<Uuid>,
    ) {
        let frame = Frame::Session(SessionFrame {
            message_type: message_type.to_string(),
            data,
            task_id,
        });
        Self::deliver(&self.sessions, session_id, frame);
    }

    /// Emits an error event to a session.
    pub fn send_error_to_session(
        &self,
        session_id: Uuid,
        error_type: &str,
        message: &str,
        task_id: Option<Uuid>,
    ) {
        self.send_to_session(
            session_id,
            "error",
            serde_json::json!({"error_type": error_type, "message": message}),
            task_id,
        );
    }

    /// Subscribers currently attached to a task.
    pub fn task_subscriber_count(&self, task_id: Uuid) -> usize {
        self.tasks.lock().get(&task_id).map_or(0, Vec::len)
    }

    fn deliver(registry: &Mutex<HashMap<Uuid, Vec<Subscriber>>>, key: Uuid, frame: Frame) {
        let mut registry = registry.lock();
        let Some(subscribers) = registry.get_mut(&key) else {
            return;
        };
        // Dead subscribers drop out silently.
        subscribers.retain(|tx| tx.send(frame.clone()).is_ok());
        if subscribers.is_empty() {
            registry.remove(&key);
        }
    }
}
