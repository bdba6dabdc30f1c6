use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by vector index operations.
pub enum VectorStoreError {
    /// Could not connect to the Qdrant endpoint.
    #[error("failed to connect to Qdrant at '{url}': {message}")]
    ConnectionFailed {
        /// Endpoint URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Collection bootstrap failed.
    #[error("failed to prepare collection '{collection}': {message}")]
    CollectionFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Upsert failed.
    #[error("failed to upsert points to '{collection}': {message}")]
    UpsertFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Search failed.
    #[error("failed to search in '{collection}': {message}")]
    SearchFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Filter-based delete failed.
    #[error("failed to delete points from '{collection}': {message}")]
    DeleteFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Scroll over document chunks failed.
    #[error("failed to scroll '{collection}': {message}")]
    ScrollFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// Payload update failed.
    #[error("failed to set payload in '{collection}': {message}")]
    SetPayloadFailed {
        /// Collection name.
        collection: String,
        /// Error message.
        message: String,
    },

    /// A read or write arrived without a tenant. Every path through the
    /// shared collection must be tenant-scoped.
    #[error("refusing vector operation without a tenant id")]
    MissingTenant,

    /// A chunk payload could not be encoded.
    #[error("invalid point payload: {message}")]
    InvalidPayload {
        /// Error message.
        message: String,
    },
}

/// Convenience result type for vector index operations.
pub type VectorStoreResult<T> = Result<T, VectorStoreError>;
