//! Event-log tailer

use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::eventlog::EventLog;
use crate::stream::{emit, emit_closing, SessionEnd, TailerOptions, WireMessage};
use crate::utils::{calc_exp_backoff, session_id};

/// Relay a resource's progress events, in append order, into `sink`
///
/// The session keeps its own cursor starting at 0, so concurrent sessions
/// for the same resource never interfere. It ends after relaying the first
/// terminal event, when the session budget runs out, or on cancellation.
/// The first two cases are followed by the `[DONE]` sentinel.
pub async fn tail_events<L>(
    log: &L,
    resource_id: &str,
    options: &TailerOptions,
    sink: mpsc::Sender<WireMessage>,
    cancel: CancellationToken,
) -> SessionEnd
where
    L: EventLog + ?Sized,
{
    let session = session_id();
    let deadline = Instant::now() + options.session_budget;
    let mut cursor: u64 = 0;
    let mut failures: u32 = 0;

    info!(%session, resource_id, "Progress session started");

    let end = 'session: loop {
        if cancel.is_cancelled() || sink.is_closed() {
            break SessionEnd::Cancelled;
        }
        if Instant::now() >= deadline {
            info!(%session, resource_id, "Session budget exhausted");
            emit_closing(&sink, WireMessage::Done);
            break SessionEnd::BudgetExpired;
        }

        let batch = tokio::select! {
            _ = cancel.cancelled() => break SessionEnd::Cancelled,
            _ = sink.closed() => break SessionEnd::Cancelled,
            _ = sleep_until(deadline) => continue,
            batch = log.read(resource_id, cursor) => batch,
        };

        let wait = match batch {
            Ok(events) if events.is_empty() => {
                failures = 0;
                options.poll_interval
            }
            Ok(events) => {
                failures = 0;
                for event in events {
                    let terminal = event.is_terminal();
                    debug!(%session, resource_id, cursor, "Relaying {}", event.event_type.as_str());
                    if !emit(&sink, &cancel, deadline, WireMessage::Event(event)).await {
                        // a stalled consumer at the deadline still gets [DONE] if there is room
                        continue 'session;
                    }
                    cursor += 1;
                    if terminal {
                        let delivered = emit(&sink, &cancel, deadline, WireMessage::Done).await
                            || (!cancel.is_cancelled() && sink.try_send(WireMessage::Done).is_ok());
                        break 'session if delivered {
                            SessionEnd::Terminal
                        } else {
                            SessionEnd::Cancelled
                        };
                    }
                }
                continue;
            }
            Err(e) => {
                let delay = calc_exp_backoff(&options.backoff, failures);
                failures = failures.saturating_add(1);
                warn!(%session, resource_id, "Event log read failed ({}), retrying in {:?}", e, delay);
                delay
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break SessionEnd::Cancelled,
            _ = sink.closed() => break SessionEnd::Cancelled,
            _ = sleep(wait) => {}
            _ = sleep_until(deadline) => {}
        }
    };

    info!(%session, resource_id, cursor, "Progress session ended: {:?}", end);
    end
}
