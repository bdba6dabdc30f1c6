//! Configuration error types.

use thiserror::Error;

/// Errors that can occur during settings loading and validation.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Port value is outside valid range (1-65535).
    #[error("invalid port '{value}': must be between 1 and 65535")]
    InvalidPort { value: String },

    /// Port string could not be parsed as a number.
    #[error("failed to parse port '{value}': {source}")]
    PortParseError {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// Bind address string could not be parsed.
    #[error("failed to parse bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// A required environment variable was not set.
    #[error("missing required environment variable: {name}")]
    MissingVar { name: &'static str },

    /// Worker count must be at least 1.
    #[error("invalid worker count '{value}': must be at least 1")]
    InvalidWorkerCount { value: String },
}
