use std::sync::Arc;

use crate::actions::{ActionDispatch, KeyValueStore};
use crate::config::Settings;
use crate::fanout::FanoutHub;
use crate::ingestion::IngestionService;
use crate::relational::TableStore;
use crate::vectordb::VectorStore;

use super::auth::AuthVerifier;

/// Shared state behind every gateway route.
pub struct GatewayState<B, V, T, K>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    /// The ingestion orchestrator.
    pub ingestion: Arc<IngestionService<B, V, T, K>>,
    /// Progress hub for the WebSocket routes.
    pub fanout: Arc<FanoutHub>,
    /// Token verification seam.
    pub auth: Arc<dyn AuthVerifier>,
    /// Service settings (upload caps, identity).
    pub settings: Arc<Settings>,
}

impl<B, V, T, K> Clone for GatewayState<B, V, T, K>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    fn clone(&self) -> Self {
        Self {
            ingestion: Arc::clone(&self.ingestion),
            fanout: Arc::clone(&self.fanout),
            auth: Arc::clone(&self.auth),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<B, V, T, K> GatewayState<B, V, T, K>
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    /// Bundles the gateway dependencies.
    pub fn new(
        ingestion: Arc<IngestionService<B, V, T, K>>,
        fanout: Arc<FanoutHub>,
        auth: Arc<dyn AuthVerifier>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            ingestion,
            fanout,
            auth,
            settings,
        }
    }
}
