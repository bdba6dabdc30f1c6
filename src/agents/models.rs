//! Agent configuration models.
//!
//! An [`AgentConfig`] is the resolved record for one agent: three typed
//! config blocks plus identity and timestamps. Rows coming back from the
//! relational store are tolerated in both `camelCase` and `snake_case`
//! shapes and normalized here; downstream code only ever sees the
//! guarantees documented on [`AgentConfig::normalize`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::AgentConfigError;

/// Stock model used when the authoritative store is unreachable.
pub const DEFAULT_QUERY_MODEL: &str = "llama-3.3-70b-versatile";
/// Stock system prompt used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
/// Default embedding model for new collections.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default embedding dimensionality.
pub const DEFAULT_EMBEDDING_DIMENSIONS: u64 = 1536;

/// Execution-service configuration block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Max agent-loop iterations per chat turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Per-turn execution timeout, seconds.
    #[serde(default = "default_execution_timeout")]
    pub timeout_secs: u64,

    /// Conversation turns kept in the prompt window.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            timeout_secs: default_execution_timeout(),
            history_window: default_history_window(),
        }
    }
}

/// Query-service configuration block (LLM parameters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Model name passed to the LLM provider.
    #[serde(default = "default_query_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Raw system prompt stored on the agent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Effective system prompt template. Non-empty after normalization.
    #[serde(default)]
    pub system_prompt_template: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            model: default_query_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
            system_prompt_template: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// RAG configuration block (retrieval + embedding parameters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    /// Virtual collections searched for this agent. Non-empty after
    /// normalization.
    #[serde(default = "default_collection_ids")]
    pub collection_ids: Vec<String>,

    /// Optional narrowing to specific documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,

    /// Hits returned per search.
    #[serde(default = "default_top_k")]
    pub top_k: u64,

    /// Minimum similarity score for a hit.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensionality.
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u64,

    /// Wire encoding of embeddings.
    #[serde(default = "default_encoding_format")]
    pub encoding_format: String,

    /// Chunk size for ingestion, characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunk overlap for ingestion, characters.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            collection_ids: default_collection_ids(),
            document_ids: None,
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            encoding_format: default_encoding_format(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Resolved agent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent id.
    pub agent_id: Uuid,

    /// Display name.
    pub agent_name: String,

    /// Owning tenant.
    pub tenant_id: Uuid,

    /// Execution block.
    #[serde(default)]
    pub execution_config: ExecutionConfig,

    /// Query block.
    #[serde(default)]
    pub query_config: QueryConfig,

    /// RAG block.
    #[serde(default)]
    pub rag_config: RagConfig,

    /// Row creation time.
    pub created_at: DateTime<Utc>,

    /// Row update time.
    pub updated_at: DateTime<Utc>,
}

impl AgentConfig {
    /// Builds an [`AgentConfig`] from a raw `agents_with_prompt` row.
    ///
    /// Accepts both `camelCase` (view) and `snake_case` (table) column
    /// names. Config blocks are whitelisted through their typed structs;
    /// unknown keys are dropped. The result is already normalized.
    pub fn from_row(row: &Value) -> Result<Self, AgentConfigError> {
        let id = require_str(row, "id")?;
        let agent_id = Uuid::parse_str(id).map_err(|_| AgentConfigError::InvalidRow {
            reason: format!("bad agent id '{id}'"),
        })?;

        let tenant = field(row, "user_id", "userId")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentConfigError::InvalidRow {
                reason: "missing user_id".to_string(),
            })?;
        let tenant_id = Uuid::parse_str(tenant).map_err(|_| AgentConfigError::InvalidRow {
            reason: format!("bad tenant id '{tenant}'"),
        })?;

        let agent_name = require_str(row, "name")?.to_string();

        let execution_config = config_block(row, "execution_config", "executionConfig");
        let mut query_config: QueryConfig = config_block(row, "query_config", "queryConfig");
        let rag_config = config_block(row, "rag_config", "ragConfig");

        // The view exposes the resolved prompt as a top-level column.
        if let Some(prompt) = field(row, "system_prompt", "systemPrompt").and_then(Value::as_str) {
            if !prompt.is_empty() {
                query_config.system_prompt_template = prompt.to_string();
            }
        }

        let created_at = parse_timestamp(row, "created_at", "createdAt")?;
        let updated_at = parse_timestamp(row, "updated_at", "updatedAt")?;

        let mut config = Self {
            agent_id,
            agent_name,
            tenant_id,
            execution_config,
            query_config,
            rag_config,
            created_at,
            updated_at,
        };
        config.normalize();
        Ok(config)
    }

    /// Enforces the config guarantees:
    /// `query_config.system_prompt_template` is non-empty (falls back to
    /// the stored `system_prompt`, then the stock prompt) and
    /// `rag_config.collection_ids` / `encoding_format` are populated.
    pub fn normalize(&mut self) {
        if self.query_config.system_prompt_template.trim().is_empty() {
            self.query_config.system_prompt_template = self
                .query_config
                .system_prompt
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(DEFAULT_SYSTEM_PROMPT)
                .to_string();
        }
        if self.rag_config.collection_ids.is_empty() {
            self.rag_config.collection_ids = default_collection_ids();
        }
        if self.rag_config.encoding_format.is_empty() {
            self.rag_config.encoding_format = default_encoding_format();
        }
    }

    /// Splits the record into its three config blocks.
    pub fn into_blocks(self) -> (ExecutionConfig, QueryConfig, RagConfig) {
        (self.execution_config, self.query_config, self.rag_config)
    }
}

/// Survival-mode configs returned when the authoritative store fails.
pub fn default_config_blocks() -> (ExecutionConfig, QueryConfig, RagConfig) {
    (
        ExecutionConfig::default(),
        QueryConfig::default(),
        RagConfig::default(),
    )
}

fn field<'a>(row: &'a Value, snake: &str, camel: &str) -> Option<&'a Value> {
    row.get(snake).or_else(|| row.get(camel))
}

fn require_str<'a>(row: &'a Value, key: &str) -> Result<&'a str, AgentConfigError> {
    row.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentConfigError::InvalidRow {
            reason: format!("missing {key}"),
        })
}

fn config_block<T: Default + for<'de> Deserialize<'de>>(row: &Value, snake: &str, camel: &str) -> T {
    field(row, snake, camel)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn parse_timestamp(row: &Value, snake: &str, camel: &str) -> Result<DateTime<Utc>, AgentConfigError> {
    let raw = field(row, snake, camel)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentConfigError::InvalidRow {
            reason: format!("missing {snake}"),
        })?;
    // RFC 3339 accepts both 'Z' and '+00:00' suffixes.
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AgentConfigError::InvalidRow {
            reason: format!("bad timestamp '{raw}': {e}"),
        })
}

fn default_max_iterations() -> u32 {
    5
}
fn default_execution_timeout() -> u64 {
    120
}
fn default_history_window() -> usize {
    10
}
fn default_query_model() -> String {
    DEFAULT_QUERY_MODEL.to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_collection_ids() -> Vec<String> {
    vec!["default".to_string()]
}
fn default_top_k() -> u64 {
    5
}
fn default_similarity_threshold() -> f32 {
    0.3
}
fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}
fn default_embedding_dimensions() -> u64 {
    DEFAULT_EMBEDDING_DIMENSIONS
}
fn default_encoding_format() -> String {
    "float".to_string()
}
fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    50
}
