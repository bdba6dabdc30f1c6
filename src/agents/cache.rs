//! Two-level agent-config cache.
//!
//! Lookup order is L1 (in-process, TTL) → L2 (shared KV, TTL) → the
//! authoritative relational store. Invalidation removes both levels;
//! writers publish `orchestrator.config.invalidate` so peer processes
//! drop their L1 too. Any resolution error degrades to survival-mode
//! default configs, logged rather than silently masked.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{AgentConfigError, AgentConfigResult};
use super::models::{AgentConfig, ExecutionConfig, QueryConfig, RagConfig, default_config_blocks};
use crate::actions::KeyValueStore;
use crate::relational::{TableStore, fetch_agent_row};
use crate::worker::{ActionHandler, HandlerError, HandlerResult};

/// Shared-KV key prefix for cached configs.
pub const CONFIG_CACHE_PREFIX: &str = "agent_config";

fn l2_key(agent_id: Uuid) -> String {
    format!("{CONFIG_CACHE_PREFIX}:{agent_id}")
}

/// Two-level config cache over the authoritative store.
pub struct ConfigCache<K: KeyValueStore, T: TableStore> {
    l1: Cache<Uuid, AgentConfig>,
    kv: Arc<K>,
    store: Arc<T>,
    ttl_secs: u64,
}

impl<K: KeyValueStore, T: TableStore> Clone for ConfigCache<K, T> {
    fn clone(&self) -> Self {
        Self {
            l1: self.l1.clone(),
            kv: Arc::clone(&self.kv),
            store: Arc::clone(&self.store),
            ttl_secs: self.ttl_secs,
        }
    }
}

impl<K: KeyValueStore, T: TableStore> std::fmt::Debug for ConfigCache<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCache")
            .field("l1_entries", &self.l1.entry_count())
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl<K: KeyValueStore, T: TableStore> ConfigCache<K, T> {
    /// Creates a cache with `ttl_secs` applied to both levels.
    ///
    /// L1 is bounded by natural churn only; explicit invalidation is the
    /// contract, not eviction.
    pub fn new(kv: Arc<K>, store: Arc<T>, ttl_secs: u64) -> Self {
        Self {
            l1: Cache::builder()
                .time_to_live(Duration::from_secs(ttl_secs))
                .build(),
            kv,
            store,
            ttl_secs,
        }
    }

    /// Resolves the three config blocks for an agent.
    ///
    /// Never fails: on any resolution error the survival-mode defaults
    /// are returned and the original error is logged at ERROR.
    pub async fn get_agent_configs(
        &self,
        agent_id: Uuid,
    ) -> (ExecutionConfig, QueryConfig, RagConfig) {
        match self.resolve(agent_id).await {
            Ok(config) => config.into_blocks(),
            Err(e) => {
                error!(
                    agent_id = %agent_id,
                    error = %e,
                    "config resolution failed, serving defaults"
                );
                default_config_blocks()
            }
        }
    }

    /// Resolves the full [`AgentConfig`], surfacing errors.
    pub async fn resolve(&self, agent_id: Uuid) -> AgentConfigResult<AgentConfig> {
        if let Some(config) = self.l1.get(&agent_id) {
            debug!(agent_id = %agent_id, "config served from L1");
            return Ok(config);
        }

        if let Some(config) = self.lookup_l2(agent_id).await {
            debug!(agent_id = %agent_id, "config served from L2");
            self.l1.insert(agent_id, config.clone());
            return Ok(config);
        }

        info!(agent_id = %agent_id, "config miss, reading authoritative store");
        let row = fetch_agent_row(self.store.as_ref(), agent_id)
            .await?
            .ok_or(AgentConfigError::NotFound { agent_id })?;
        let config = AgentConfig::from_row(&row)?;

        self.populate(agent_id, &config).await;
        Ok(config)
    }

    /// Drops an agent's config from both cache levels.
    pub async fn invalidate(&self, agent_id: Uuid) {
        self.l1.invalidate(&agent_id);
        if let Err(e) = self.kv.delete(&l2_key(agent_id)).await {
            warn!(agent_id = %agent_id, error = %e, "L2 invalidation failed");
        }
        info!(agent_id = %agent_id, "agent config invalidated");
    }

    async fn lookup_l2(&self, agent_id: Uuid) -> Option<AgentConfig> {
        match self.kv.get(&l2_key(agent_id)).await {
            Ok(Some(raw)) => match serde_json::from_str::<AgentConfig>(&raw) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "discarding unreadable L2 entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "L2 read failed");
                None
            }
        }
    }

    async fn populate(&self, agent_id: Uuid, config: &AgentConfig) {
        match serde_json::to_string(config) {
            Ok(raw) => {
                if let Err(e) = self.kv.set_with_ttl(&l2_key(agent_id), &raw, self.ttl_secs).await {
                    warn!(agent_id = %agent_id, error = %e, "L2 write failed");
                }
            }
            Err(e) => warn!(agent_id = %agent_id, error = %e, "config not serializable for L2"),
        }
        self.l1.insert(agent_id, config.clone());
    }
}

/// Handler for `orchestrator.config.invalidate`.
///
/// Fire-and-forget: writers to the authoritative store publish this so
/// every process drops its cached copy.
pub struct InvalidateConfigHandler<K: KeyValueStore, T: TableStore> {
    cache: ConfigCache<K, T>,
}

impl<K: KeyValueStore, T: TableStore> InvalidateConfigHandler<K, T> {
    /// Wraps a cache.
    pub fn new(cache: ConfigCache<K, T>) -> Self {
        Self { cache }
    }
}

#[async_trait::async_trait]
impl<K, T> ActionHandler for InvalidateConfigHandler<K, T>
where
    K: KeyValueStore + 'static,
    T: TableStore + 'static,
{
    async fn handle(
        &self,
        action: crate::actions::DomainAction,
    ) -> HandlerResult<Option<Value>> {
        let agent_id = action
            .data
            .get("agent_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .or(action.agent_id)
            .ok_or_else(|| HandlerError::validation("agent_id is required"))?;

        self.cache.invalidate(agent_id).await;
        Ok(None)
    }
}
