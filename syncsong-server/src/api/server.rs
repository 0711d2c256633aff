//! HTTP server setup and routing
//!
//! Sets up the Axum router for room lookups, catalog search, health and the
//! room WebSocket.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::registry::RoomRegistry;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<RoomRegistry>,
    pub catalog: Arc<dyn Catalog>,
}

impl AppContext {
    pub fn new(registry: Arc<RoomRegistry>, catalog: Arc<dyn Catalog>) -> Self {
        Self { registry, catalog }
    }
}

pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(super::handlers::root))
        .route("/health", get(super::handlers::health))
        // Room lookup
        .route("/room/:code/create", post(super::handlers::create_room))
        .route("/room/:code/exists", get(super::handlers::room_exists))
        // Catalog proxy
        .route("/search", get(super::handlers::search))
        // Room channel
        .route("/ws/:code", get(super::ws::ws_handler))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Participants are served from other origins
        .layer(CorsLayer::permissive())
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn run<F>(listener: tokio::net::TcpListener, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = listener.local_addr()?;
    info!("Starting HTTP server on {}", addr);

    axum::serve(listener, create_router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
