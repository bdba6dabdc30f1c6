use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::bus::ActionDispatch;
use super::error::{ActionBusError, ActionBusResult};
use super::kv::KeyValueStore;
use super::model::DomainAction;

#[derive(Default)]
pub struct MockActionBus {
    sent: Mutex<Vec<DomainAction>>,
    replies: Mutex<VecDeque<DomainAction>>,
    fail_sends: AtomicBool,
}

impl MockActionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every action accepted by any send primitive, in order.
    pub fn sent(&self) -> Vec<DomainAction> {
        self.sent.lock().clone()
    }

    /// Sent actions of one type.
    pub fn sent_of_type(&self, action_type: &str) -> Vec<DomainAction> {
        self.sent
            .lock()
            .iter()
            .filter(|a| a.action_type == action_type)
            .cloned()
            .collect()
    }

    /// Queues a reply returned by the next `send_and_wait`.
    pub fn script_reply(&self, reply: DomainAction) {
        self.replies.lock().push_back(reply);
    }

    /// Makes subsequent sends fail (fire-and-forget swallows, the rest
    /// surface the error).
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }

    fn failing(&self) -> bool {
        self.fail_sends.load(Ordering::Relaxed)
    }
}

impl ActionDispatch for MockActionBus {
    async fn send_fire_and_forget(&self, action: DomainAction) -> ActionBusResult<()> {
        if !self.failing() {
            self.sent.lock().push(action);
        }
        Ok(())
    }

    async fn send_with_callback(
        &self,
        mut action: DomainAction,
        callback_event_name: &str,
    ) -> ActionBusResult<()> {
        if self.failing() {
            return Err(ActionBusError::SendFailed {
                queue: action.action_type.clone(),
                message: "mock send failure".to_string(),
            });
        }
        if action.callback_action_type.is_none() {
            action.callback_action_type = Some(callback_event_name.to_string());
        }
        self.sent.lock().push(action);
        Ok(())
    }

    async fn send_and_wait(
        &self,
        action: DomainAction,
        timeout: Duration,
    ) -> ActionBusResult<DomainAction> {
        if self.failing() {
            return Err(ActionBusError::SendFailed {
                queue: action.action_type.clone(),
                message: "mock send failure".to_string(),
            });
        }
        let action_id = action.action_id;
        self.sent.lock().push(action);
        self.replies
            .lock()
            .pop_front()
            .ok_or(ActionBusError::Timeout {
                action_id,
                timeout_secs: timeout.as_secs(),
            })
    }

    async fn deliver_reply(
        &self,
        _original: &DomainAction,
        reply: DomainAction,
    ) -> ActionBusResult<()> {
        if self.failing() {
            return Err(ActionBusError::SendFailed {
                queue: reply.action_type.clone(),
                message: "mock send failure".to_string(),
            });
        }
        self.sent.lock().push(reply);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockKv {
    entries: Mutex<HashMap<String, (String, u64)>>,
}

impl MockKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// TTL recorded for `key`, for assertions.
    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        self.entries.lock().get(key).map(|(_, ttl)| *ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MockKv {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> ActionBusResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), ttl_secs));
        Ok(())
    }

    async fn get(&self, key: &str) -> ActionBusResult<Option<String>> {
        Ok(self.entries.lock().get(key).map(|(v, _)| v.clone()))
    }

    async fn delete(&self, key: &str) -> ActionBusResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
