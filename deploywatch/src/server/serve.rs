//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::PipelineError;
use crate::server::handlers::{
    delete_resource_handler, health_handler, ingest_handler, list_resources_handler,
    logs_handler, progress_handler, put_resource_handler, reconcile_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the router without binding a socket
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Progress streams and ingest
        .route("/progress", get(progress_handler))
        .route("/progress/{resource_id}/events", post(ingest_handler))
        // Raw runtime logs
        .route("/logs", get(logs_handler))
        // Registry and reconciliation
        .route("/reconcile", post(reconcile_handler))
        .route("/resources", get(list_resources_handler))
        .route(
            "/resources/{resource_id}",
            put(put_resource_handler).delete(delete_resource_handler),
        )
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
///
/// Once `shutdown_signal` resolves, open streaming sessions are cancelled
/// and the server drains.
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), PipelineError>>, PipelineError> {
    let sessions = state.shutdown.clone();
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PipelineError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal.await;
                sessions.cancel();
            })
            .await
            .map_err(|e| PipelineError::ServerError(e.to_string()))
    });

    Ok(handle)
}
