//! HTTP server
//!
//! Wires the request pipeline: bearer-token authentication wraps every
//! bundle route, then handlers delegate into the lifecycle orchestrator.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::auth;
use crate::error::{Error, Result};
use crate::handlers;
use crate::lifecycle::Lifecycle;
use crate::store::MetadataStore;

/// Uploads carry a values document plus an optional archive
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// The lifecycle orchestrator
    pub lifecycle: Arc<Lifecycle>,
    /// The metadata store, for token verification
    pub store: Arc<dyn MetadataStore>,
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/bundles", post(handlers::upload).get(handlers::list))
        .route(
            "/bundles/{id}",
            get(handlers::details).delete(handlers::delete),
        )
        .route("/bundles/{id}/logs", get(handlers::logs))
        .route("/bundles/{id}/install", post(handlers::install))
        .route("/bundles/{id}/stop", post(handlers::stop))
        .route(
            "/bundles/{id}/deliver",
            post(handlers::deliver).delete(handlers::undeliver),
        )
        .route("/delivered", get(handlers::delivered))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_tenant,
        ))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .merge(api)
        .with_state(state)
}

/// Bind and serve until the listener fails
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::io("binding listener", e))?;
    info!(%addr, "berth listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::io("serving", e))?;
    Ok(())
}
