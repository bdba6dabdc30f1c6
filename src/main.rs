//! Nooble service entrypoint.
//!
//! One binary hosts any combination of the service roles, selected with
//! `NOOBLE_SERVICES` (comma-separated: `ingestion`, `orchestrator`,
//! `conversation`; default all three). Each role contributes handlers to
//! the worker registry; the ingestion role also serves the HTTP/WS
//! gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use nooble::actions::{
    CONVERSATION_MESSAGE_CREATE, CONVERSATION_SESSION_CLOSED, INGESTION_DOCUMENT_AGENTS_UPDATE,
    INGESTION_DOCUMENT_PROCESS, INGESTION_DOCUMENT_STATUS, INGESTION_EMBEDDING_CALLBACK,
    ORCHESTRATOR_CHAT_RESPONSE, ORCHESTRATOR_CONFIG_INVALIDATE, RedisActionBus, RedisKv,
};
use nooble::agents::{ConfigCache, InvalidateConfigHandler};
use nooble::chat::ChatResponseHandler;
use nooble::config::Settings;
use nooble::conversation::{MessageCreateHandler, PersistenceService, SessionClosedHandler};
use nooble::fanout::FanoutHub;
use nooble::gateway::{GatewayState, RestAuthVerifier, create_router_with_state};
use nooble::ingestion::{
    AgentsUpdateHandler, DocumentStatusHandler, EmbeddingCallbackHandler, IngestionService,
    ProcessDocumentHandler,
};
use nooble::relational::RestTableClient;
use nooble::vectordb::{DEFAULT_VECTOR_SIZE, QdrantIndex, VectorStore};
use nooble::worker::{HandlerRegistry, WorkerRuntime};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn enabled_roles() -> Vec<String> {
    std::env::var("NOOBLE_SERVICES")
        .unwrap_or_else(|_| "ingestion,orchestrator,conversation".to_string())
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Arc::new(Settings::from_env()?);
    settings.validate()?;
    let roles = enabled_roles();

    info!(
        service = %settings.service_name,
        version = %settings.service_version,
        roles = ?roles,
        "nooble starting"
    );

    let bus = Arc::new(RedisActionBus::from_url(&settings.redis_url)?);
    let kv = Arc::new(RedisKv::new(bus.pool().clone()));
    let store = Arc::new(RestTableClient::new(
        &settings.relational_url,
        &settings.relational_anon_key,
        settings.relational_service_key.as_deref(),
    )?);
    let vector = Arc::new(
        QdrantIndex::new(
            &settings.qdrant_url,
            settings.qdrant_api_key.as_deref(),
            DEFAULT_VECTOR_SIZE,
        )
        .await?,
    );
    vector.ensure_ready().await?;

    let fanout = Arc::new(FanoutHub::new());
    let configs = ConfigCache::new(
        Arc::clone(&kv),
        Arc::clone(&store),
        settings.config_cache_ttl_secs,
    );

    let ingestion = Arc::new(IngestionService::new(
        Arc::clone(&bus),
        Arc::clone(&vector),
        Arc::clone(&store),
        Arc::clone(&kv),
        Arc::clone(&fanout),
        Arc::clone(&settings),
    ));

    let mut registry = HandlerRegistry::new();

    if roles.iter().any(|r| r == "ingestion") {
        registry.register(
            INGESTION_DOCUMENT_PROCESS,
            Arc::new(ProcessDocumentHandler::new(Arc::clone(&ingestion))),
        );
        registry.register(
            INGESTION_DOCUMENT_STATUS,
            Arc::new(DocumentStatusHandler::new(Arc::clone(&ingestion))),
        );
        registry.register(
            INGESTION_DOCUMENT_AGENTS_UPDATE,
            Arc::new(AgentsUpdateHandler::new(Arc::clone(&ingestion))),
        );
        registry.register(
            INGESTION_EMBEDDING_CALLBACK,
            Arc::new(EmbeddingCallbackHandler::new(Arc::clone(&ingestion))),
        );
    }

    if roles.iter().any(|r| r == "orchestrator") {
        registry.register(
            ORCHESTRATOR_CHAT_RESPONSE,
            Arc::new(ChatResponseHandler::new(
                Arc::clone(&bus),
                Arc::clone(&fanout),
                settings.service_name.clone(),
            )),
        );
        registry.register(
            ORCHESTRATOR_CONFIG_INVALIDATE,
            Arc::new(InvalidateConfigHandler::new(configs.clone())),
        );
    }

    if roles.iter().any(|r| r == "conversation") {
        let persistence = Arc::new(PersistenceService::new(Arc::clone(&store)));
        registry.register(
            CONVERSATION_MESSAGE_CREATE,
            Arc::new(MessageCreateHandler::new(Arc::clone(&persistence))),
        );
        registry.register(
            CONVERSATION_SESSION_CLOSED,
            Arc::new(SessionClosedHandler::new(persistence)),
        );
    }

    let runtime = Arc::new(WorkerRuntime::new(
        bus.as_ref().clone(),
        Arc::new(registry),
        settings.service_name.clone(),
        settings.worker_count,
    ));
    let workers = Arc::clone(&runtime).spawn();

    if roles.iter().any(|r| r == "ingestion") {
        let auth = Arc::new(RestAuthVerifier::new(
            &settings.relational_url,
            &settings.relational_anon_key,
        ));
        let state = GatewayState::new(
            Arc::clone(&ingestion),
            Arc::clone(&fanout),
            auth,
            Arc::clone(&settings),
        );
        let app = create_router_with_state(state);

        let addr: SocketAddr = settings.socket_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    runtime.stop();
    for worker in workers {
        let _ = worker.await;
    }

    info!("nooble shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
