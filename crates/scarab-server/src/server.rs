//! Control server lifecycle: bind, serve, and background startup.
//!
//! The server exposes a single `WebSocket` endpoint at `GET /`. Binding
//! happens eagerly so that a taken port fails fast -- a bind failure is
//! the one server error that should abort process startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;
use crate::ws;

/// Errors that can occur when starting or running the control server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address. Fatal at startup.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// Network configuration for the control server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// TCP port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 1234,
        }
    }
}

impl ServerConfig {
    /// Derive the server address from a simulation configuration.
    pub fn from_simulation(config: &scarab_core::SimulationConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

/// Build the Axum router for the control endpoint.
///
/// CORS is open so browser dashboards can connect from any origin.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(ws::ws_control))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the listener and serve until the process terminates.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address is unusable or the port
/// is taken, [`ServerError::Serve`] on a fatal I/O error while serving.
pub async fn start_server(config: &ServerConfig, state: Arc<AppState>) -> Result<(), ServerError> {
    let listener = bind(config).await?;
    serve(listener, state).await
}

/// Spawn the control server on a background task.
///
/// Binds eagerly so a taken port surfaces here rather than inside the
/// background task, and returns the actual bound address (useful when
/// the configured port is 0) together with the task handle.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the listener cannot bind.
pub async fn spawn_control_server(
    config: &ServerConfig,
    state: Arc<AppState>,
) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
    let listener = bind(config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("local_addr failed: {e}")))?;

    let handle = tokio::spawn(async move {
        if let Err(err) = serve(listener, state).await {
            tracing::error!(error = %err, "control server exited with error");
        }
    });

    info!(%addr, "control server spawned on background task");
    Ok((addr, handle))
}

async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;
    info!(%addr, "control server listening");
    Ok(listener)
}

async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), ServerError> {
    let router = build_router(state);
    axum::serve(listener, router)
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))
}
