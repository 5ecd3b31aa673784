//! Web server module.

mod handlers;

pub use handlers::*;

use crate::calendar::IdentifierResolver;
use crate::config::ServerConfig;
use crate::db::WatchStore;
use crate::scheduler::Clock;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<dyn WatchStore>,
    pub resolver: Arc<dyn IdentifierResolver>,
    pub clock: Arc<dyn Clock>,
}

/// Web server for managing watches.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn WatchStore>,
        resolver: Arc<dyn IdentifierResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: AppState {
                config,
                store,
                resolver,
                clock,
            },
        }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            // Dashboard
            .route("/", get(handlers::handle_dashboard))
            .route("/add", post(handlers::handle_add_form))
            .route("/watches/{id}/delete", post(handlers::handle_delete_form))
            // API endpoints
            .route("/api/watches", get(handlers::handle_get_watches))
            .route("/api/watches", post(handlers::handle_create_watch))
            .route("/api/watches/{id}", delete(handlers::handle_delete_watch))
            .route("/api/watches/{id}/history", get(handlers::handle_get_history))
            // Static assets
            .route("/static/{*path}", get(handlers::handle_static))
            .route("/favicon.ico", get(handlers::handle_favicon))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
