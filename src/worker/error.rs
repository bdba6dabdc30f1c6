use thiserror::Error;

use crate::actions::ErrorKind;

#[derive(Debug, Error)]
/// A handler failure with its wire-level kind attached.
#[error("{kind}: {message}")]
pub struct HandlerError {
    /// Taxonomy kind carried on failure callbacks as `error_type`.
    pub kind: ErrorKind,
    /// Human-readable message. This is what clients see; never put
    /// internals in it.
    pub message: String,
}

impl HandlerError {
    /// Builds an error of an explicit kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Malformed or incomplete action payload.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Referenced task/agent/document does not exist.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Unhandled failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// Convenience result type for action handlers.
pub type HandlerResult<T> = Result<T, HandlerError>;
