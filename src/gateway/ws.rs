//! WebSocket progress endpoint.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::state::GatewayState;
use crate::actions::{ActionDispatch, KeyValueStore};
use crate::fanout::{FanoutHub, Frame};
use crate::relational::TableStore;
use crate::vectordb::VectorStore;

/// `GET /ws/ingestion/{task_id}`: stream progress frames for one task.
#[instrument(skip(state, upgrade), fields(task_id = %task_id))]
pub async fn ingestion_ws_handler<B, V, T, K>(
    State(state): State<GatewayState<B, V, T, K>>,
    Path(task_id): Path<Uuid>,
    upgrade: WebSocketUpgrade,
) -> Response
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    let fanout = std::sync::Arc::clone(&state.fanout);
    upgrade.on_upgrade(move |socket| stream_task_progress(socket, fanout, task_id))
}

async fn stream_task_progress(
    mut socket: WebSocket,
    fanout: std::sync::Arc<FanoutHub>,
    task_id: Uuid,
) {
    let mut frames = fanout.subscribe_task(task_id);
    debug!(task_id = %task_id, "progress stream opened");

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    // Client is gone; the hub prunes us on its next send.
                    break;
                }
                if is_terminal(&frame) {
                    break;
                }
            }
            inbound = socket.recv() => {
                // Clients only ever close or ping; any error ends the
                // stream.
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    debug!(task_id = %task_id, "progress stream closed");
}

fn is_terminal(frame: &Frame) -> bool {
    match frame {
        Frame::Progress(p) => p.status == "completed" || p.status == "failed",
        Frame::Session(_) => false,
    }
}
