use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by the relational store facade.
pub enum TableStoreError {
    /// Transport-level failure reaching the store.
    #[error("relational store unreachable: {message}")]
    Network {
        /// Error message.
        message: String,
    },

    /// The store answered with a non-success status.
    #[error("relational request on '{table}' failed with status {status}: {message}")]
    Http {
        /// Table involved.
        table: String,
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// A `.single()` read matched no row.
    #[error("no row found in '{table}'")]
    RowNotFound {
        /// Table involved.
        table: String,
    },

    /// Row payload could not be encoded or decoded.
    #[error("row serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result type for relational operations.
pub type TableStoreResult<T> = Result<T, TableStoreError>;
