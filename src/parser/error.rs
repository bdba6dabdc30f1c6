use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by document parsing.
pub enum ParserError {
    /// Document exceeds the size cap for its type. Checked before any
    /// parsing work happens.
    #[error("{document_type} document is {size_bytes} bytes, over the {limit_bytes} byte limit")]
    FileTooLarge {
        /// Declared type.
        document_type: String,
        /// Actual size.
        size_bytes: u64,
        /// Configured cap.
        limit_bytes: u64,
    },

    /// Declared type is not in the supported set.
    #[error("unsupported document type: {document_type}")]
    UnsupportedType {
        /// Declared type.
        document_type: String,
    },

    /// The request carried no content source.
    #[error("no content source provided (expected content, file_path, or url)")]
    NoContent,

    /// Local file could not be read.
    #[error("failed to read '{path}': {message}")]
    FileRead {
        /// Path involved.
        path: String,
        /// Error message.
        message: String,
    },

    /// URL fetch failed or timed out.
    #[error("failed to fetch '{url}': {message}")]
    FetchFailed {
        /// URL involved.
        url: String,
        /// Error message.
        message: String,
    },

    /// Format-specific extraction failed on every strategy.
    #[error("{document_type} extraction failed: {message}")]
    ExtractionFailed {
        /// Declared type.
        document_type: String,
        /// Error message.
        message: String,
    },

    /// Chunking parameters are unusable.
    #[error("invalid chunking parameters: {reason}")]
    InvalidChunking {
        /// What was wrong.
        reason: String,
    },
}

/// Convenience result type for parser operations.
pub type ParserResult<T> = Result<T, ParserError>;
