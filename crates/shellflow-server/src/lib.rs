//! Shellflow Server - HTTP surface for the execution and workflow engine.
//!
//! Provides:
//! - one-shot command execution and SSE-streamed sessions
//! - workflow definition CRUD backed by SQLite
//! - SSE-streamed workflow runs with cancellation
//!
//! This crate can be used standalone or embedded (the `shellflow` CLI
//! starts it via the `server` subcommand).

pub mod api;

pub use shellflow_core::{db, error, state};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use shellflow_core::EngineConfig;

use self::db::Database;
use self::state::{AppState, AppStateInner};

/// Configuration for the Shellflow HTTP server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3210,
            db_path: "shellflow.db".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

/// Create a shared `AppState` from a database path.
pub async fn create_app_state(db_path: &str, engine: EngineConfig) -> Result<AppState, String> {
    let db = Database::open(db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Arc::new(AppStateInner::new(db, engine)))
}

/// Start the HTTP server.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig) -> Result<SocketAddr, String> {
    // A host binary may already have installed a subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "shellflow_core=info,shellflow_server=info,tower_http=info".into()
            }),
        )
        .try_init();

    tracing::info!(
        "Starting Shellflow server on {}:{}",
        config.host,
        config.port
    );

    let state = create_app_state(&config.db_path, config.engine.clone()).await?;

    start_server_with_state(config, state).await
}

/// Build the router for `state`, without binding.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server with a pre-built `AppState`.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("Shellflow server listening on {}", local_addr);

    let app = app(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "shellflow-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
