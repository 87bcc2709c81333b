//! Recall API Gateway
//!
//! The entry point for all external API requests.
//! Handles:
//! - Conversation persistence (save, list, fetch)
//! - Memory search (hybrid retrieval over past conversations)
//! - Insight alerts and weekly digests
//! - Observability (logging, metrics, tracing)

mod handlers;
mod transcript;

use axum::{
    routing::{get, post},
    Router,
};
use recall_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::{create_embedder, Embedder},
    metrics,
};
use recall_retrieval::RetrievalEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub repository: Repository,
    pub embedder: Arc<dyn Embedder>,
    pub engine: Arc<RetrievalEngine>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting Recall API Gateway v{}", recall_common::VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    let config = Arc::new(config);

    // Initialize metrics
    metrics::register_metrics();

    if config.observability.metrics_port != 0 {
        let exporter_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(exporter_addr)
            .install()?;
        info!("Prometheus exporter listening on {}", exporter_addr);
    }

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repository = Repository::new(db.clone());

    // Initialize embedder
    let embedder = create_embedder(&config.embedding);
    info!(
        model = %embedder.model_name(),
        dimension = embedder.dimension(),
        "Embedder initialized"
    );

    // Initialize the retrieval engine
    let engine = Arc::new(RetrievalEngine::new(
        Arc::new(repository.clone()),
        embedder.clone(),
        config.retrieval.clone(),
    ));

    // Create app state
    let state = AppState {
        config: config.clone(),
        db,
        repository,
        embedder,
        engine,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Conversation endpoints
        .route(
            "/conversations",
            post(handlers::conversations::save_conversation)
                .get(handlers::conversations::list_conversations),
        )
        .route("/conversations/{id}", get(handlers::conversations::get_conversation))

        // Memory search endpoint
        .route("/memory/search", post(handlers::memory::search_memories))

        // Insight endpoints
        .route("/insights/alerts", get(handlers::insights::list_alerts))
        .route("/insights/alerts/{id}/dismiss", post(handlers::insights::dismiss_alert))
        .route("/insights/digests/latest", get(handlers::insights::latest_digest));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
