//! Document ingestion: admission, pipeline state machine, callback join,
//! and dual-store persistence.

pub mod error;
pub mod handlers;
pub mod service;
pub mod task;

#[cfg(test)]
mod tests;

pub use error::{IngestionError, IngestionResult};
pub use handlers::{
    AgentsUpdateHandler, DocumentStatusHandler, EmbeddingCallbackHandler, ProcessDocumentHandler,
};
pub use service::{
    DocumentIngestionRequest, IngestionResponse, IngestionService, TaskStatusView,
    generate_batch_collection_id,
};
pub use task::{
    IngestionStatus, IngestionTask, TASK_MIRROR_TTL_SECS, TaskStore, normalize_agent_ids,
    task_mirror_key,
};
