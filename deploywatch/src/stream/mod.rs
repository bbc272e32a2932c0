//! Stream tailers: bridge the event log or a runtime log connection to an
//! outbound message channel
//!
//! A session writes [`WireMessage`]s into an `mpsc` channel whose receiver
//! backs the client's HTTP response. Each session stops as soon as its
//! [`CancellationToken`] fires or the receiver is dropped, and never
//! outlives its wall-clock budget.

pub mod logs;
pub mod tailer;
pub mod wire;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::utils::CooldownOptions;

pub use logs::{relay_logs, resolve_container};
pub use tailer::tail_events;
pub use wire::{WireMessage, DONE_SENTINEL, END_EVENT};

/// Tailer options
#[derive(Debug, Clone)]
pub struct TailerOptions {
    /// Wait between event-log polls that returned nothing
    pub poll_interval: Duration,

    /// Hard wall-clock limit for one streaming session
    pub session_budget: Duration,

    /// Backoff applied while the event log is unavailable
    pub backoff: CooldownOptions,

    /// History lines requested before following a runtime log
    pub log_tail_lines: Option<u32>,

    /// Ask the runtime to prefix log lines with timestamps
    pub log_timestamps: bool,
}

impl Default for TailerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            session_budget: Duration::from_secs(120),
            backoff: CooldownOptions::default(),
            log_tail_lines: Some(200),
            log_timestamps: false,
        }
    }
}

/// Why a streaming session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// A terminal progress event was relayed
    Terminal,
    /// The session budget ran out
    BudgetExpired,
    /// The consumer went away or the session was cancelled
    Cancelled,
    /// The runtime closed the log stream
    UpstreamClosed,
    /// The runtime log stream failed
    UpstreamFailed,
}

/// Send one message unless the consumer is gone or stalled past `deadline`
///
/// Returns `false` when the session should stop.
pub(crate) async fn emit(
    sink: &mpsc::Sender<WireMessage>,
    cancel: &CancellationToken,
    deadline: Instant,
    message: WireMessage,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = sink.send(message) => sent.is_ok(),
        _ = sleep_until(deadline) => false,
    }
}

/// Best-effort closing message once the budget is spent
pub(crate) fn emit_closing(sink: &mpsc::Sender<WireMessage>, message: WireMessage) {
    let _ = sink.try_send(message);
}
