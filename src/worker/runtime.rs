//! Consumer loop.
//!
//! A service runs N workers (default 2), each blocking on the broker
//! queues its registry serves and processing one action at a time. Errors
//! never poison a queue: a failed fire-and-forget action is logged and
//! dropped, a failed request/response action produces a failure callback
//! carrying `{error, error_type}`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::error::HandlerError;
use super::registry::HandlerRegistry;
use crate::actions::{ActionDispatch, DomainAction, RedisActionBus};

const POP_TIMEOUT_SECS: f64 = 1.0;
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Validates an action before dispatch.
///
/// Request/response actions must carry a `task_id` for callback
/// correlation and a non-empty payload; fire-and-forget actions validate
/// their own payloads in the handler (a logged skip, never a retry
/// storm).
pub fn validate_action(registry: &HandlerRegistry, action: &DomainAction) -> Result<(), HandlerError> {
    if !registry.is_registered(&action.action_type) {
        return Err(HandlerError::validation(format!(
            "unsupported action type: {}",
            action.action_type
        )));
    }
    if action.expects_callback() {
        if action.task_id.is_none() {
            return Err(HandlerError::validation("task_id is required"));
        }
        if action.data.is_empty() {
            return Err(HandlerError::validation("data must not be empty"));
        }
    }
    Ok(())
}

/// Processes one consumed action: validate, dispatch, reply.
pub async fn process_action<B: ActionDispatch>(
    registry: &HandlerRegistry,
    bus: &B,
    service_name: &str,
    action: DomainAction,
) {
    let outcome = match validate_action(registry, &action) {
        Ok(()) => registry.dispatch(action.clone()).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(Some(value)) if action.expects_callback() => {
            if let Some(reply) = action.reply(service_name, value) {
                if let Err(e) = bus.deliver_reply(&action, reply).await {
                    error!(
                        action_id = %action.action_id,
                        tenant_id = %action.tenant_id,
                        error = %e,
                        "failed to deliver callback"
                    );
                }
            }
        }
        Ok(_) => {}
        Err(e) => {
            error!(
                action_id = %action.action_id,
                action_type = %action.action_type,
                tenant_id = %action.tenant_id,
                session_id = ?action.session_id,
                error_type = %e.kind,
                error = %e.message,
                "action handler failed"
            );

            // Request/response senders get a failure callback; everyone
            // else already logged, and the queue must not be poisoned.
            if action.expects_callback() {
                if let Some(reply) = action.reply(service_name, failure_payload(&e)) {
                    if let Err(send_err) = bus.deliver_reply(&action, reply).await {
                        error!(
                            action_id = %action.action_id,
                            error = %send_err,
                            "failed to deliver failure callback"
                        );
                    }
                }
            }
        }
    }
}

/// Long-running consumer for one service.
pub struct WorkerRuntime {
    bus: RedisActionBus,
    registry: Arc<HandlerRegistry>,
    service_name: String,
    worker_count: usize,
    stop: Arc<AtomicBool>,
}

impl std::fmt::Debug for WorkerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRuntime")
            .field("service_name", &self.service_name)
            .field("worker_count", &self.worker_count)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl WorkerRuntime {
    /// Creates a runtime consuming the registry's queues.
    pub fn new(
        bus: RedisActionBus,
        registry: Arc<HandlerRegistry>,
        service_name: impl Into<String>,
        worker_count: usize,
    ) -> Self {
        Self {
            bus,
            registry,
            service_name: service_name.into(),
            worker_count: worker_count.max(1),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the worker tasks and returns their join handles.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let queues = self.registry.queues();
        info!(
            service = %self.service_name,
            workers = self.worker_count,
            queues = ?queues,
            "worker runtime starting"
        );

        (0..self.worker_count)
            .map(|worker_index| {
                let runtime = Arc::clone(&self);
                let queues = queues.clone();
                tokio::spawn(async move {
                    runtime.consume_loop(worker_index, queues).await;
                })
            })
            .collect()
    }

    /// Signals every worker to exit after its current action.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    async fn consume_loop(&self, worker_index: usize, queues: Vec<String>) {
        info!(
            service = %self.service_name,
            worker = worker_index,
            "worker started"
        );

        while !self.stop.load(Ordering::Relaxed) {
            match self.bus.pop(&queues, POP_TIMEOUT_SECS).await {
                Ok(Some(action)) => {
                    process_action(&self.registry, &self.bus, &self.service_name, action).await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        service = %self.service_name,
                        worker = worker_index,
                        error = %e,
                        "broker receive failed"
                    );
                    tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
                }
            }
        }

        info!(
            service = %self.service_name,
            worker = worker_index,
            "worker stopped"
        );
    }
}

/// Builds the failure payload a handler error produces on the wire.
pub fn failure_payload(error: &HandlerError) -> Value {
    json!({"error": error.message, "error_type": error.kind.as_str()})
}
