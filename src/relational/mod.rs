//! Typed facade over the relational store.
//!
//! All access is equality-filter CRUD over named tables, the only shape
//! the services need. Rows arrive as JSON; views expose `camelCase`
//! columns while tables use `snake_case`, so row normalization lives with
//! the types that consume them (see [`crate::agents`]).

pub mod client;
pub mod error;
pub mod models;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod tests;

pub use client::{RestTableClient, TableStore};
pub use error::{TableStoreError, TableStoreResult};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockTableStore;
pub use models::{
    ConversationRow, DocumentRow, MessageRow, TABLE_AGENTS_WITH_PROMPT, TABLE_CONVERSATIONS,
    TABLE_DOCUMENTS_RAG, TABLE_MESSAGES, TABLE_TENANTS, TABLE_USER_TENANTS, TenantInfo,
    check_tenant_membership, fetch_agent_row, fetch_tenant_info,
};
