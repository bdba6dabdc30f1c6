//! # Nooble Core
//!
//! Multi-service backend core for agent-driven conversational workflows
//! with RAG.
//!
//! Services cooperate over a Redis action bus: an orchestrator resolves
//! agent configs and dispatches chat turns, an ingestion service runs a
//! parse → chunk → embed → store pipeline joined by an asynchronous
//! embedding callback, and a conversation service persists exchanges
//! fire-and-forget. One physical vector collection serves every tenant
//! through hierarchical payload filtering.
//!
//! ```text
//! HTTP upload → ingestion task → chunks → embedding.batch_process ──▶ embedder
//!                                                                      │
//!       WebSocket ◀─ progress ─ callback join ─ vector + metadata ◀────┘
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Purpose |
//! |---------|---------|
//! | `mock` | In-memory backends for tests/examples |
//!
//! ## Modules
//!
//! - [`actions`] - Typed action envelope + Redis bus
//! - [`worker`] - Consumer runtime and handler dispatch
//! - [`agents`] - Agent configs and the two-level cache
//! - [`vectordb`] - Multi-tenant Qdrant index
//! - [`parser`] - Document extraction, cleaning, chunking
//! - [`ingestion`] - Ingestion orchestrator and task state machine
//! - [`fanout`] - WebSocket progress fan-out
//! - [`chat`] - Chat orchestration and response callback
//! - [`conversation`] - Conversation persistence
//! - [`relational`] - Typed facade over the relational store
//! - [`gateway`] - HTTP/WebSocket surface
//! - [`config`] - Environment settings

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod actions;
pub mod agents;
pub mod chat;
pub mod config;
pub mod conversation;
pub mod fanout;
pub mod gateway;
pub mod ingestion;
pub mod parser;
pub mod relational;
pub mod vectordb;
pub mod worker;

pub use actions::{
    ActionBusError, ActionDispatch, DomainAction, ErrorKind, KeyValueStore, RedisActionBus,
    RedisKv,
};
#[cfg(any(test, feature = "mock"))]
pub use actions::{MockActionBus, MockKv};
pub use agents::{AgentConfig, ConfigCache, ExecutionConfig, QueryConfig, RagConfig};
pub use chat::{ChatOrchestrator, ChatRequest, ChatResponseHandler, SessionState};
pub use config::{Settings, SettingsError};
pub use conversation::PersistenceService;
pub use fanout::{FanoutHub, Frame, ProgressFrame};
pub use gateway::{AuthContext, AuthVerifier, GatewayState, create_router_with_state};
pub use ingestion::{
    DocumentIngestionRequest, IngestionResponse, IngestionService, IngestionStatus,
};
pub use parser::{Chunk, DocumentParser, DocumentType};
#[cfg(any(test, feature = "mock"))]
pub use relational::MockTableStore;
pub use relational::{RestTableClient, TableStore};
#[cfg(any(test, feature = "mock"))]
pub use vectordb::MockVectorIndex;
pub use vectordb::{AgentsOperation, QdrantIndex, SearchParams, VectorStore};
pub use worker::{ActionHandler, HandlerRegistry, WorkerRuntime};
