//! HTTP/WebSocket surface of the ingestion service.
//!
//! The gateway is deliberately thin: authentication resolves to a
//! `{user_id, tenant_id}` pair, requests map onto orchestrator calls,
//! and errors map onto status codes without leaking internals.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;


use axum::Router;
use axum::routing::{delete, get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use auth::{AuthContext, AuthVerifier, RestAuthVerifier, authenticate};
#[cfg(any(test, feature = "mock"))]
pub use auth::MockAuthVerifier;
pub use error::{ApiError, ErrorResponse};
pub use state::GatewayState;

use crate::actions::{ActionDispatch, KeyValueStore};
use crate::relational::TableStore;
use crate::vectordb::VectorStore;

/// Builds the ingestion router over a gateway state.
pub fn create_router_with_state<B, V, T, K>(state: GatewayState<B, V, T, K>) -> Router
where
    B: ActionDispatch + 'static,
    V: VectorStore + 'static,
    T: TableStore + 'static,
    K: KeyValueStore + 'static,
{
    Router::new()
        .route("/health", get(routes::health_handler))
        .route("/ingest", post(routes::ingest_handler))
        .route("/batch-ingest", post(routes::batch_ingest_handler))
        .route("/upload", post(routes::upload_handler))
        .route("/document/{document_id}", delete(routes::delete_document_handler))
        .route(
            "/document/{document_id}/agents",
            put(routes::update_agents_handler),
        )
        .route("/status/{task_id}", get(routes::status_handler))
        .route("/ws/ingestion/{task_id}", get(ws::ingestion_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
