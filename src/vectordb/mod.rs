//! Multi-tenant vector index over one physical Qdrant collection.

pub mod client;
pub mod error;
pub mod model;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod tests;

pub use client::{QdrantIndex, VectorStore};
pub use error::{VectorStoreError, VectorStoreResult};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockVectorIndex, cosine_similarity};
pub use model::{
    AGENTS_SCROLL_LIMIT, AgentsOperation, COLLECTION_NAME, DEFAULT_VECTOR_SIZE,
    EmbeddingMetadata, PAYLOAD_INDEX_FIELDS, SearchHit, SearchParams, UpsertOutcome,
    agents_from_payload, apply_agents_operation, chunk_payload,
};
