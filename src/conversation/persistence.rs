//! Durable storage of conversation exchanges.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::relational::{
    ConversationRow, MessageRow, TABLE_CONVERSATIONS, TABLE_MESSAGES, TableStore,
    TableStoreResult,
};

/// Writes exchanges and session lifecycle to the relational store.
pub struct PersistenceService<T: TableStore> {
    store: Arc<T>,
}

impl<T: TableStore> std::fmt::Debug for PersistenceService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceService").finish_non_exhaustive()
    }
}

impl<T: TableStore> PersistenceService<T> {
    /// Creates the service over a table store.
    pub fn new(store: Arc<T>) -> Self {
        Self { store }
    }

    /// Persists one complete exchange: the conversation row is reused
    /// when it exists (keyed by `id = conversation_id`) and created
    /// otherwise, then both messages are inserted.
    #[allow(clippy::too_many_arguments)]
    pub async fn save_conversation_exchange(
        &self,
        conversation_id: Uuid,
        tenant_id: Uuid,
        session_id: Uuid,
        agent_id: Uuid,
        user_message: &str,
        agent_message: &str,
        metadata: Option<Value>,
    ) -> TableStoreResult<()> {
        self.get_or_create_conversation(conversation_id, tenant_id, session_id, agent_id)
            .await?;

        let metadata = metadata.unwrap_or_else(|| json!({}));
        for (role, content) in [("user", user_message), ("assistant", agent_message)] {
            let row = MessageRow {
                conversation_id,
                role: role.to_string(),
                content: content.to_string(),
                metadata: metadata.clone(),
            };
            self.store
                .insert(
                    TABLE_MESSAGES,
                    serde_json::to_value(&row)?,
                )
                .await?;
        }

        info!(
            conversation_id = %conversation_id,
            tenant_id = %tenant_id,
            session_id = %session_id,
            message_count = 2,
            "exchange persisted"
        );
        Ok(())
    }

    /// Closes the active conversation for `(tenant, session, agent)`.
    /// Returns whether a row was actually closed.
    pub async fn mark_conversation_ended(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
        agent_id: Uuid,
    ) -> TableStoreResult<bool> {
        let updated = self
            .store
            .update(
                TABLE_CONVERSATIONS,
                &[
                    ("tenant_id", &tenant_id.to_string()),
                    ("session_id", &session_id.to_string()),
                    ("agent_id", &agent_id.to_string()),
                    ("is_active", "true"),
                ],
                json!({
                    "is_active": false,
                    "ended_at": chrono::Utc::now().to_rfc3339(),
                }),
            )
            .await?;

        if updated == 0 {
            warn!(
                tenant_id = %tenant_id,
                session_id = %session_id,
                agent_id = %agent_id,
                "no active conversation to close"
            );
            return Ok(false);
        }
        Ok(true)
    }

    async fn get_or_create_conversation(
        &self,
        conversation_id: Uuid,
        tenant_id: Uuid,
        session_id: Uuid,
        agent_id: Uuid,
    ) -> TableStoreResult<()> {
        let existing = self
            .store
            .select_one(TABLE_CONVERSATIONS, &[("id", &conversation_id.to_string())])
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        let row = ConversationRow {
            id: conversation_id,
            tenant_id,
            session_id,
            agent_id,
            is_active: true,
            ended_at: None,
        };
        self.store
            .insert(TABLE_CONVERSATIONS, serde_json::to_value(&row)?)
            .await?;

        info!(conversation_id = %conversation_id, "conversation created");
        Ok(())
    }
}
