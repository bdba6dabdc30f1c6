use thiserror::Error;
use uuid::Uuid;

use crate::actions::{ActionBusError, ErrorKind};
use crate::parser::ParserError;
use crate::relational::TableStoreError;
use crate::vectordb::VectorStoreError;
use crate::worker::HandlerError;

#[derive(Debug, Error)]
/// Errors returned by the ingestion orchestrator.
pub enum IngestionError {
    /// Malformed or incomplete request.
    #[error("invalid ingestion request: {message}")]
    Validation {
        /// What was wrong.
        message: String,
    },

    /// The collection is already pinned to a different embedding model.
    /// The caller must pick another `collection_id`.
    #[error(
        "collection '{collection_id}' already uses model '{existing_model}' \
         with {existing_dimensions} dimensions; models cannot be mixed"
    )]
    CollectionModelMismatch {
        /// Collection involved.
        collection_id: String,
        /// Model the collection is pinned to.
        existing_model: String,
        /// Its dimensionality.
        existing_dimensions: u64,
    },

    /// No task with this id (or not visible to the caller).
    #[error("task not found: {task_id}")]
    TaskNotFound {
        /// Task id.
        task_id: Uuid,
    },

    /// Document not present in the metadata store.
    #[error("document not found: {document_id}")]
    DocumentNotFound {
        /// Document id.
        document_id: Uuid,
    },

    /// Parsing failed.
    #[error(transparent)]
    Parser(#[from] ParserError),

    /// Vector index failure.
    #[error(transparent)]
    Vector(#[from] VectorStoreError),

    /// Relational store failure.
    #[error(transparent)]
    Relational(#[from] TableStoreError),

    /// Broker failure.
    #[error(transparent)]
    Bus(#[from] ActionBusError),
}

impl IngestionError {
    /// Wire-level kind for failure callbacks and progress frames.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestionError::Validation { .. } | IngestionError::Parser(_) => ErrorKind::Validation,
            IngestionError::CollectionModelMismatch { .. } => ErrorKind::CollectionModelMismatch,
            IngestionError::TaskNotFound { .. } | IngestionError::DocumentNotFound { .. } => {
                ErrorKind::NotFound
            }
            IngestionError::Vector(_) | IngestionError::Relational(_) => ErrorKind::Storage,
            IngestionError::Bus(ActionBusError::Timeout { .. }) => ErrorKind::Timeout,
            IngestionError::Bus(_) => ErrorKind::ServiceUnavailable,
        }
    }
}

impl From<IngestionError> for HandlerError {
    fn from(e: IngestionError) -> Self {
        HandlerError::new(e.kind(), e.to_string())
    }
}

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;
