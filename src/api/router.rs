//! API router configuration.

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{
    api_info, create_session, delete_attribute, delete_session, get_session, health,
    put_attribute, set_default_timeout, statistics, AppState,
};
use crate::error::SessionError;
use crate::manager::DistributableSessionManager;
use crate::wrapper::batch_middleware;

/// Create the API router over `manager`.
///
/// Every route runs inside a request batch installed by
/// [`batch_middleware`].
pub fn create_router(manager: Arc<DistributableSessionManager>) -> Router {
    let wrapper = manager.request_wrapper().clone();
    let state = AppState::new(manager);

    // Session routes
    let session_routes = Router::new()
        .route("/", axum::routing::post(create_session))
        .route("/{id}", get(get_session).delete(delete_session))
        .route(
            "/{id}/attributes/{name}",
            put(put_attribute).delete(delete_attribute),
        );

    // API v1 routes
    let api_v1 = Router::new()
        .route("/", get(api_info))
        .route("/statistics", get(statistics))
        .route("/settings/default-timeout", put(set_default_timeout))
        .nest("/sessions", session_routes);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1)
        .layer(middleware::from_fn_with_state(wrapper, batch_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Serve the API until `shutdown` resolves.
pub async fn serve(
    config: ServerConfig,
    manager: Arc<DistributableSessionManager>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> crate::Result<()> {
    let addr = config.bind_address();
    let router = create_router(manager);

    tracing::info!("Starting distributable-session API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(SessionError::Io)?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(SessionError::Io)?;

    Ok(())
}
