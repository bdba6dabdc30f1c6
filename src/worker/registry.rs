//! Action dispatch registry.
//!
//! Dispatch is a mapping from `action_type` to handler, not an
//! inheritance hierarchy: each service registers handlers for the action
//! types it owns and the registry derives the broker queues to consume.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::error::{HandlerError, HandlerResult};
use crate::actions::{DomainAction, queue_for};

/// One registered action handler.
///
/// Returning `Ok(Some(value))` on a callback-bearing action makes the
/// runtime wrap `value` in the reply action; `Ok(None)` means the handler
/// owns any further signalling (fire-and-forget handlers, and handlers
/// that emit their own callbacks downstream).
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Processes one action.
    async fn handle(&self, action: DomainAction) -> HandlerResult<Option<Value>>;
}

/// Registry of the action types a service serves.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("action_types", &types)
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `action_type`, replacing any previous one.
    pub fn register(&mut self, action_type: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action_type.into(), handler);
    }

    /// Returns the handler for an action type.
    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action_type).cloned()
    }

    /// True when the action type is served here.
    pub fn is_registered(&self, action_type: &str) -> bool {
        self.handlers.contains_key(action_type)
    }

    /// Broker queues this registry consumes.
    pub fn queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.handlers.keys().map(|t| queue_for(t)).collect();
        queues.sort_unstable();
        queues
    }

    /// Dispatches one action to its handler.
    pub async fn dispatch(&self, action: DomainAction) -> HandlerResult<Option<Value>> {
        let handler = self
            .get(&action.action_type)
            .ok_or_else(|| HandlerError::validation(format!(
                "unsupported action type: {}",
                action.action_type
            )))?;
        handler.handle(action).await
    }
}
