use thiserror::Error;
use uuid::Uuid;

use crate::actions::ActionBusError;
use crate::relational::TableStoreError;

#[derive(Debug, Error)]
/// Errors returned by agent-config resolution.
pub enum AgentConfigError {
    /// Agent row does not exist.
    #[error("agent not found: {agent_id}")]
    NotFound {
        /// Agent id.
        agent_id: Uuid,
    },

    /// Row could not be normalized into an [`super::AgentConfig`].
    #[error("invalid agent row: {reason}")]
    InvalidRow {
        /// What was wrong with the row.
        reason: String,
    },

    /// Authoritative store failure.
    #[error("relational store error: {0}")]
    Store(#[from] TableStoreError),

    /// Shared cache failure.
    #[error("shared cache error: {0}")]
    Cache(#[from] ActionBusError),
}

/// Convenience result type for config operations.
pub type AgentConfigResult<T> = Result<T, AgentConfigError>;
