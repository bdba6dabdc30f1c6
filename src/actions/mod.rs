//! Typed inter-service actions and the Redis action bus.
//!
//! Every piece of cross-service work in the system travels as a
//! [`DomainAction`]: fire-and-forget notifications, request/response
//! exchanges joined by a callback action type, and pseudo-synchronous
//! calls that wait on a correlation channel.

pub mod bus;
pub mod error;
pub mod kv;
pub mod model;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod tests;

pub use bus::{ActionDispatch, RedisActionBus};
pub use error::{ActionBusError, ActionBusResult, ErrorKind};
pub use kv::{KeyValueStore, RedisKv};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockActionBus, MockKv};
pub use model::{
    CONVERSATION_MESSAGE_CREATE, CONVERSATION_SESSION_CLOSED, DomainAction,
    EMBEDDING_BATCH_PROCESS, EXECUTION_CHAT_ADVANCE, EXECUTION_CHAT_SIMPLE, EXECUTION_TASK_CANCEL,
    INGESTION_DOCUMENT_AGENTS_UPDATE, INGESTION_DOCUMENT_PROCESS, INGESTION_DOCUMENT_STATUS,
    INGESTION_EMBEDDING_CALLBACK, ORCHESTRATOR_CHAT_RESPONSE, ORCHESTRATOR_CONFIG_INVALIDATE,
    queue_for, reply_queue_for,
};
