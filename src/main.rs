//! Turnstile server
//!
//! Serves the chat turn API over HTTP, checkpointing threads to SQLite.

use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::{
        predicate::{DefaultPredicate, NotForContentType, Predicate},
        CompressionLayer,
    },
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnstile::api::{create_router, AppState};
use turnstile::codec;
use turnstile::config::Config;
use turnstile::db::Database;
use turnstile::llm::{LoggingInvoker, ModelRegistry, OpenAiCompatInvoker};
use turnstile::runtime::{ConversationEngine, DatabaseStorage, EngineSettings};
use turnstile::tools::ToolRouter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turnstile=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(config = ?config, "Loaded configuration");

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let models = Arc::new(ModelRegistry::new(config.llm.clone()));
    if models.has_credentials() {
        tracing::info!(
            models = ?models.available_models(),
            default = %models.default_model_id(),
            "Model registry initialized"
        );
    } else {
        tracing::warn!("No model API key configured. Set OPENAI_API_KEY.");
    }

    let invoker = LoggingInvoker::new(Arc::new(OpenAiCompatInvoker::new()?));
    let router = ToolRouter::for_profile(config.environment);
    tracing::info!(
        environment = ?config.environment,
        tools = ?router.describe(),
        "Tools registered"
    );

    let engine = ConversationEngine::new(
        Arc::new(DatabaseStorage::new(db)),
        Arc::new(invoker),
        Arc::new(router),
        models,
        EngineSettings {
            turn_deadline: config.turn_deadline,
            history_cache_capacity: config.history_cache_size,
            ..EngineSettings::default()
        },
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Compressing the turn stream would hold records back in the encoder
    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true)
        .compress_when(
            DefaultPredicate::new().and(NotForContentType::const_new(codec::CONTENT_TYPE)),
        );

    let app = create_router(AppState::new(engine))
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Turnstile server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
