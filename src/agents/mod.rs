//! Agent configuration: models, normalization, and the two-level cache.

pub mod cache;
pub mod error;
pub mod models;

#[cfg(test)]
mod tests;

pub use cache::{CONFIG_CACHE_PREFIX, ConfigCache, InvalidateConfigHandler};
pub use error::{AgentConfigError, AgentConfigResult};
pub use models::{
    AgentConfig, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL, DEFAULT_QUERY_MODEL,
    DEFAULT_SYSTEM_PROMPT, ExecutionConfig, QueryConfig, RagConfig, default_config_blocks,
};
