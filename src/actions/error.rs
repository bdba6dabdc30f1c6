use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-level error taxonomy carried on failure callbacks and progress
/// frames as `error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials rejected. Never retried.
    AuthFailed,
    /// Malformed or incomplete request.
    Validation,
    /// Task, agent, or document missing.
    NotFound,
    /// Collection already pinned to a different embedding model.
    CollectionModelMismatch,
    /// A downstream dependency is unreachable.
    ServiceUnavailable,
    /// A `send_and_wait` exceeded its bound.
    Timeout,
    /// Vector or relational write failure.
    Storage,
    /// Task cancelled on request.
    Cancelled,
    /// Anything unhandled.
    Internal,
}

impl ErrorKind {
    /// Wire string for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::CollectionModelMismatch => "collection_model_mismatch",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Storage => "storage",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
/// Errors returned by the action bus and the shared KV.
pub enum ActionBusError {
    /// Could not reach the broker.
    #[error("failed to connect to broker: {message}")]
    ConnectionFailed {
        /// Error message.
        message: String,
    },

    /// Enqueue failed after retries.
    #[error("failed to enqueue on '{queue}': {message}")]
    SendFailed {
        /// Target queue.
        queue: String,
        /// Error message.
        message: String,
    },

    /// Dequeue failed.
    #[error("failed to consume from broker: {message}")]
    ReceiveFailed {
        /// Error message.
        message: String,
    },

    /// No reply arrived on the correlation channel in time.
    #[error("timed out after {timeout_secs}s waiting for reply to action {action_id}")]
    Timeout {
        /// Action that was waited on.
        action_id: uuid::Uuid,
        /// Configured bound, seconds.
        timeout_secs: u64,
    },

    /// Payload could not be encoded or decoded.
    #[error("action serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shared KV operation failed.
    #[error("shared kv operation failed for '{key}': {message}")]
    KvFailed {
        /// Key involved.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Convenience result type for bus operations.
pub type ActionBusResult<T> = Result<T, ActionBusError>;
