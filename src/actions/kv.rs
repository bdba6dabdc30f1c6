//! Shared key-value facade over the broker connection.
//!
//! Used for the ingestion task mirror (`ingestion:task:<task_id>`, 1 h
//! TTL) and the L2 agent-config cache (`agent_config:<agent_id>`).

use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Connection, Pool};

use super::error::{ActionBusError, ActionBusResult};

/// Minimal TTL'd KV surface used by the caches and the task mirror.
pub trait KeyValueStore: Send + Sync {
    /// Writes `value` under `key` with a TTL in seconds.
    fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl std::future::Future<Output = ActionBusResult<()>> + Send;

    /// Reads `key`, `None` when absent or expired.
    fn get(&self, key: &str)
    -> impl std::future::Future<Output = ActionBusResult<Option<String>>> + Send;

    /// Removes `key`.
    fn delete(&self, key: &str) -> impl std::future::Future<Output = ActionBusResult<()>> + Send;
}

#[derive(Clone)]
/// Redis-backed [`KeyValueStore`], sharing the bus pool.
pub struct RedisKv {
    pool: Pool,
}

impl std::fmt::Debug for RedisKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKv").finish_non_exhaustive()
    }
}

impl RedisKv {
    /// Creates a KV facade over an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn conn(&self, key: &str) -> ActionBusResult<Connection> {
        self.pool.get().await.map_err(|e| ActionBusError::KvFailed {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

impl KeyValueStore for RedisKv {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> ActionBusResult<()> {
        let mut conn = self.conn(key).await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| ActionBusError::KvFailed {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    async fn get(&self, key: &str) -> ActionBusResult<Option<String>> {
        let mut conn = self.conn(key).await?;
        conn.get(key).await.map_err(|e| ActionBusError::KvFailed {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> ActionBusResult<()> {
        let mut conn = self.conn(key).await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| ActionBusError::KvFailed {
                key: key.to_string(),
                message: e.to_string(),
            })
    }
}
