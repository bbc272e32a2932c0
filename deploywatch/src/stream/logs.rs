//! Raw runtime log relay

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::PipelineError;
use crate::registry::ResourceRegistry;
use crate::runtime::frames::{split_lines, FrameDemuxer};
use crate::runtime::{ContainerRuntime, LogQuery};
use crate::stream::{emit, emit_closing, SessionEnd, TailerOptions, WireMessage};
use crate::utils::session_id;

/// Look up the container a resource runs in
///
/// Unknown resources and resources that were never scheduled are
/// `NotFound`, so callers can answer 404 before opening a stream.
pub async fn resolve_container<R>(registry: &R, resource_id: &str) -> Result<String, PipelineError>
where
    R: ResourceRegistry + ?Sized,
{
    let record = registry
        .get(resource_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("resource {}", resource_id)))?;

    record
        .container_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PipelineError::NotFound(format!("no container for resource {}", resource_id)))
}

/// Follow a container's logs and relay one message per non-empty line
///
/// Upstream failures are reported inline as an `[error] ...` line because
/// the client stream has already started. The follow connection is closed
/// on every exit path, including consumer disconnect.
pub async fn relay_logs<C>(
    runtime: &C,
    container_id: &str,
    options: &TailerOptions,
    sink: mpsc::Sender<WireMessage>,
    cancel: CancellationToken,
) -> SessionEnd
where
    C: ContainerRuntime + ?Sized,
{
    let session = session_id();
    let deadline = Instant::now() + options.session_budget;
    let query = LogQuery {
        tail: options.log_tail_lines,
        timestamps: options.log_timestamps,
    };

    info!(%session, container_id, "Log session started");

    let opened = tokio::select! {
        _ = cancel.cancelled() => return SessionEnd::Cancelled,
        _ = sink.closed() => return SessionEnd::Cancelled,
        _ = sleep_until(deadline) => {
            emit_closing(&sink, WireMessage::End);
            return SessionEnd::BudgetExpired;
        }
        opened = runtime.follow_logs(container_id, &query) => opened,
    };

    let mut upstream = match opened {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!(%session, container_id, "Failed to open log stream: {}", e);
            if emit(&sink, &cancel, deadline, WireMessage::error_line(&e)).await {
                emit(&sink, &cancel, deadline, WireMessage::End).await;
            }
            return SessionEnd::UpstreamFailed;
        }
    };

    let mut demuxer = FrameDemuxer::new();
    let mut lines_sent: u64 = 0;

    let end = 'session: loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => break SessionEnd::Cancelled,
            _ = sink.closed() => break SessionEnd::Cancelled,
            _ = sleep_until(deadline) => {
                info!(%session, container_id, "Session budget exhausted");
                emit_closing(&sink, WireMessage::End);
                break SessionEnd::BudgetExpired;
            }
            chunk = upstream.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                let text = demuxer.push_text(&bytes);
                for line in split_lines(&text) {
                    if !emit(&sink, &cancel, deadline, WireMessage::Line(line.to_string())).await {
                        continue 'session;
                    }
                    lines_sent += 1;
                }
            }
            Some(Err(e)) => {
                warn!(%session, container_id, "Log stream failed: {}", e);
                if emit(&sink, &cancel, deadline, WireMessage::error_line(&e)).await {
                    emit(&sink, &cancel, deadline, WireMessage::End).await;
                }
                break SessionEnd::UpstreamFailed;
            }
            None => {
                let text = demuxer.finish();
                for line in split_lines(&text) {
                    if !emit(&sink, &cancel, deadline, WireMessage::Line(line.to_string())).await {
                        break 'session SessionEnd::Cancelled;
                    }
                    lines_sent += 1;
                }
                emit(&sink, &cancel, deadline, WireMessage::End).await;
                break SessionEnd::UpstreamClosed;
            }
        }
    };

    // close the follow connection now rather than whenever the task unwinds
    drop(upstream);
    debug!(%session, container_id, "Runtime log connection closed");
    info!(%session, container_id, lines_sent, "Log session ended: {:?}", end);
    end
}
