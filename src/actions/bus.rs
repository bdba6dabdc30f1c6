//! Redis-backed action bus.
//!
//! One broker list per `action_type` (`LPUSH` to produce, `BRPOP` to
//! consume). Pseudo-synchronous sends wait on a private correlation list
//! keyed by `action_id`. Producer calls retry with exponential backoff
//! (base 1 s, cap 10 s, 3 attempts).

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config as RedisConfig, Connection, Pool, Runtime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{ActionBusError, ActionBusResult};
use super::model::{DomainAction, queue_for, reply_queue_for};

const MAX_SEND_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Producer surface of the action bus.
///
/// The three primitives of the inter-service protocol. Implemented by
/// [`RedisActionBus`] and, under the `mock` feature, by
/// [`super::MockActionBus`].
pub trait ActionDispatch: Send + Sync {
    /// Enqueues an action nobody replies to. A failed send is logged and
    /// swallowed; this never surfaces an error to the caller.
    fn send_fire_and_forget(
        &self,
        action: DomainAction,
    ) -> impl std::future::Future<Output = ActionBusResult<()>> + Send;

    /// Enqueues an action whose recipient will eventually emit an action
    /// of type `callback_event_name` carrying the same `task_id`. Send
    /// failures surface so the caller can fail its task.
    fn send_with_callback(
        &self,
        action: DomainAction,
        callback_event_name: &str,
    ) -> impl std::future::Future<Output = ActionBusResult<()>> + Send;

    /// Enqueues an action and blocks on its correlation channel until the
    /// reply arrives or `timeout` elapses.
    fn send_and_wait(
        &self,
        action: DomainAction,
        timeout: Duration,
    ) -> impl std::future::Future<Output = ActionBusResult<DomainAction>> + Send;

    /// Consumer-side complement of the three send primitives: delivers a
    /// reply produced while processing `original`: to its private
    /// correlation list when the sender is waiting synchronously,
    /// otherwise to the queue named by the reply's own action type.
    fn deliver_reply(
        &self,
        original: &DomainAction,
        reply: DomainAction,
    ) -> impl std::future::Future<Output = ActionBusResult<()>> + Send;
}

#[derive(Clone)]
/// Action bus over a Redis connection pool.
pub struct RedisActionBus {
    pool: Pool,
}

impl std::fmt::Debug for RedisActionBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisActionBus").finish_non_exhaustive()
    }
}

impl RedisActionBus {
    /// Creates a bus over an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Creates a pool for `url` and a bus over it.
    pub fn from_url(url: &str) -> ActionBusResult<Self> {
        let pool = RedisConfig::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ActionBusError::ConnectionFailed {
                message: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    /// Returns the underlying pool (shared with the KV facade).
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> ActionBusResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| ActionBusError::ConnectionFailed {
                message: e.to_string(),
            })
    }

    async fn try_push(&self, queue: &str, payload: &str) -> ActionBusResult<()> {
        let mut conn = self.conn().await?;
        conn.lpush::<_, _, ()>(queue, payload)
            .await
            .map_err(|e| ActionBusError::SendFailed {
                queue: queue.to_string(),
                message: e.to_string(),
            })
    }

    async fn push_with_retry(&self, queue: &str, payload: &str) -> ActionBusResult<()> {
        let attempts = AtomicU32::new(0);
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(BACKOFF_BASE)
            .with_max_interval(BACKOFF_CAP)
            .with_max_elapsed_time(None)
            .build();

        backoff::future::retry(policy, || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            async move {
                match self.try_push(queue, payload).await {
                    Ok(()) => Ok(()),
                    Err(e) if attempt >= MAX_SEND_ATTEMPTS => Err(backoff::Error::permanent(e)),
                    Err(e) => {
                        warn!(queue, attempt, error = %e, "broker send failed, retrying");
                        Err(backoff::Error::transient(e))
                    }
                }
            }
        })
        .await
    }

    /// Enqueues an action on the queue named after its `action_type`.
    pub async fn enqueue(&self, action: &DomainAction) -> ActionBusResult<()> {
        let queue = queue_for(&action.action_type);
        let payload = serde_json::to_string(action)?;
        self.push_with_retry(&queue, &payload).await?;
        debug!(
            action_id = %action.action_id,
            action_type = %action.action_type,
            queue,
            "action enqueued"
        );
        Ok(())
    }

    /// Pushes a reply onto a private correlation list.
    pub async fn push_reply(&self, reply_to: &str, action: &DomainAction) -> ActionBusResult<()> {
        let payload = serde_json::to_string(action)?;
        self.push_with_retry(reply_to, &payload).await
    }

    /// Blocks up to `timeout_secs` for one action across `queues`.
    ///
    /// Returns `None` on timeout so consumer loops can poll shutdown
    /// flags between waits.
    pub async fn pop(
        &self,
        queues: &[String],
        timeout_secs: f64,
    ) -> ActionBusResult<Option<DomainAction>> {
        let mut conn = self.conn().await?;
        let popped: Option<(String, String)> = conn
            .brpop(queues, timeout_secs)
            .await
            .map_err(|e| ActionBusError::ReceiveFailed {
                message: e.to_string(),
            })?;

        match popped {
            Some((_queue, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn wait_for_reply(
        &self,
        action_id: Uuid,
        timeout: Duration,
    ) -> ActionBusResult<DomainAction> {
        let reply_queue = reply_queue_for(action_id);
        let timeout_secs = timeout.as_secs().max(1);
        let mut conn = self.conn().await?;

        let popped: Option<(String, String)> = conn
            .brpop(&reply_queue, timeout_secs as f64)
            .await
            .map_err(|e| ActionBusError::ReceiveFailed {
                message: e.to_string(),
            })?;

        match popped {
            Some((_queue, payload)) => Ok(serde_json::from_str(&payload)?),
            None => Err(ActionBusError::Timeout {
                action_id,
                timeout_secs,
            }),
        }
    }
}

impl ActionDispatch for RedisActionBus {
    async fn send_fire_and_forget(&self, action: DomainAction) -> ActionBusResult<()> {
        if let Err(e) = self.enqueue(&action).await {
            warn!(
                action_id = %action.action_id,
                action_type = %action.action_type,
                error = %e,
                "fire-and-forget send failed, dropping action"
            );
        }
        Ok(())
    }

    async fn send_with_callback(
        &self,
        mut action: DomainAction,
        callback_event_name: &str,
    ) -> ActionBusResult<()> {
        if action.callback_action_type.is_none() {
            action.callback_action_type = Some(callback_event_name.to_string());
        }
        self.enqueue(&action).await
    }

    async fn send_and_wait(
        &self,
        mut action: DomainAction,
        timeout: Duration,
    ) -> ActionBusResult<DomainAction> {
        let action_id = action.action_id;
        action.reply_to = Some(reply_queue_for(action_id));
        self.enqueue(&action).await?;
        self.wait_for_reply(action_id, timeout).await
    }

    async fn deliver_reply(
        &self,
        original: &DomainAction,
        reply: DomainAction,
    ) -> ActionBusResult<()> {
        match original.reply_to.as_deref() {
            Some(reply_queue) => self.push_reply(reply_queue, &reply).await,
            None => self.enqueue(&reply).await,
        }
    }
}
