//! HTTP request handlers

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::PipelineError;
use crate::models::event::ProgressEvent;
use crate::models::resource::{ResourceHealth, ResourceRecord};
use crate::registry::modify_record;
use crate::server::state::ServerState;
use crate::stream::{relay_logs, resolve_container, tail_events, WireMessage};
use crate::utils::version_info;

/// Outbound messages buffered per session before the tailer waits on the client
const SESSION_BUFFER: usize = 64;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = match &self {
            PipelineError::ValidationError(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Conflict(_) => StatusCode::CONFLICT,
            PipelineError::EventLogUnavailable(_) | PipelineError::RegistryError(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PipelineError::RuntimeError(_) | PipelineError::HttpError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "deploywatch".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

fn require_resource_id(resource_id: Option<String>) -> Result<String, PipelineError> {
    match resource_id.map(|id| id.trim().to_string()) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(PipelineError::ValidationError(
            "resourceId is required".to_string(),
        )),
    }
}

/// Turn a session's message channel into an SSE body
///
/// The body owns a drop guard for the session's token, so a client
/// disconnect cancels the session. The body ends after the closing message.
fn sse_body(
    rx: mpsc::Receiver<WireMessage>,
    cancel: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let guard = cancel.drop_guard();
    let events = futures::stream::unfold(
        (rx, guard, false),
        |(mut rx, guard, closed)| async move {
            if closed {
                return None;
            }
            let message = rx.recv().await?;
            let closing = message.is_closing();
            let event = message.to_sse().unwrap_or_else(|e| {
                warn!("Dropping unencodable stream message: {}", e);
                Event::default().comment("unencodable message")
            });
            Some((Ok::<_, Infallible>(event), (rx, guard, closing)))
        },
    );
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    pub resource_id: Option<String>,
}

/// Progress wire stream for one resource
pub async fn progress_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ProgressQuery>,
) -> Result<impl IntoResponse, PipelineError> {
    let resource_id = require_resource_id(query.resource_id)?;

    let registered = state.registry.get(&resource_id).await?.is_some();
    let known = registered
        || match state.event_log.contains(&resource_id).await {
            Ok(found) => found,
            // let the tailer back off instead of rejecting a live deploy
            Err(e) if e.is_transient() => {
                warn!("Event log unavailable while opening {}: {}", resource_id, e);
                true
            }
            Err(e) => return Err(e),
        };
    if !known {
        return Err(PipelineError::NotFound(format!("resource {}", resource_id)));
    }

    let cancel = state.shutdown.child_token();
    let (tx, rx) = mpsc::channel(SESSION_BUFFER);
    let session_state = state.clone();
    let token = cancel.clone();
    tokio::spawn(async move {
        tail_events(
            session_state.event_log.as_ref(),
            &resource_id,
            &session_state.tailer,
            tx,
            token,
        )
        .await;
    });

    Ok(sse_body(rx, cancel))
}

/// Ingest response
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Position the event was recorded at
    pub cursor: u64,
}

/// Append one event on behalf of the deploy worker
///
/// The resource id in the path wins over the one in the body.
pub async fn ingest_handler(
    State(state): State<Arc<ServerState>>,
    Path(resource_id): Path<String>,
    Json(mut event): Json<ProgressEvent>,
) -> Result<impl IntoResponse, PipelineError> {
    let resource_id = require_resource_id(Some(resource_id))?;
    event.resource_id = resource_id.clone();

    let event_type = event.event_type;
    let cursor = state.event_log.append(&resource_id, event).await?;
    debug!("Appended {} for {} at {}", event_type.as_str(), resource_id, cursor);

    Ok((StatusCode::CREATED, Json(IngestResponse { cursor })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub resource_id: Option<String>,
    pub tail: Option<u32>,
    pub timestamps: Option<bool>,
}

/// Raw runtime log stream for one resource
pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, PipelineError> {
    let resource_id = require_resource_id(query.resource_id)?;
    let container_id = resolve_container(state.registry.as_ref(), &resource_id).await?;

    let mut options = state.tailer.clone();
    if let Some(tail) = query.tail {
        options.log_tail_lines = Some(tail);
    }
    if let Some(timestamps) = query.timestamps {
        options.log_timestamps = timestamps;
    }

    let cancel = state.shutdown.child_token();
    let (tx, rx) = mpsc::channel(SESSION_BUFFER);
    let session_state = state.clone();
    let token = cancel.clone();
    tokio::spawn(async move {
        relay_logs(
            session_state.runtime.as_ref(),
            &container_id,
            &options,
            tx,
            token,
        )
        .await;
    });

    Ok(sse_body(rx, cancel))
}

/// Operator-triggered reconciliation pass
pub async fn reconcile_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, PipelineError> {
    info!("Reconciliation requested");
    let report = state.reconciler.reconcile().await?;
    Ok(Json(report))
}

/// Registry listing response
#[derive(Debug, Serialize, Deserialize)]
pub struct ResourcesResponse {
    pub resources: Vec<ResourceRecord>,
    pub total: usize,
}

pub async fn list_resources_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, PipelineError> {
    let resources = state.registry.list().await?;
    let total = resources.len();
    Ok(Json(ResourcesResponse { resources, total }))
}

/// Body of a registry write
#[derive(Debug, Default, Deserialize)]
pub struct ResourceUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub health: Option<ResourceHealth>,
}

/// Create or update a registry record
///
/// Fields missing from the body keep their current value.
pub async fn put_resource_handler(
    State(state): State<Arc<ServerState>>,
    Path(resource_id): Path<String>,
    Json(update): Json<ResourceUpdate>,
) -> Result<impl IntoResponse, PipelineError> {
    let resource_id = require_resource_id(Some(resource_id))?;

    let modified = modify_record(state.registry.as_ref(), &resource_id, |current| {
        let mut record =
            current.unwrap_or_else(|| ResourceRecord::new(resource_id.clone(), None));
        if update.name.is_some() {
            record.name = update.name.clone();
        }
        if update.container_id.is_some() {
            record.container_id = update.container_id.clone();
        }
        if let Some(health) = update.health {
            record.health = health;
        }
        Some(record)
    })
    .await?
    .ok_or_else(|| PipelineError::Internal(format!("resource {} was not written", resource_id)))?;

    let status = if modified.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(modified.record)))
}

/// Mark a resource deleted; the next reconciliation removes it and its container
pub async fn delete_resource_handler(
    State(state): State<Arc<ServerState>>,
    Path(resource_id): Path<String>,
) -> Result<impl IntoResponse, PipelineError> {
    let modified = modify_record(state.registry.as_ref(), &resource_id, |current| {
        current.map(|record| record.with_health(ResourceHealth::Deleted))
    })
    .await?
    .ok_or_else(|| PipelineError::NotFound(format!("resource {}", resource_id)))?;
    info!("Resource {} marked deleted", resource_id);

    Ok((StatusCode::ACCEPTED, Json(modified.record)))
}
