//! Wire messages relayed to streaming clients

use axum::response::sse::Event;

use crate::errors::PipelineError;
use crate::models::event::ProgressEvent;

/// Payload that closes a progress stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// SSE event name that closes a raw-log stream
pub const END_EVENT: &str = "end";

/// One message of an outbound stream, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// A progress event, JSON-encoded on the wire
    Event(ProgressEvent),
    /// One decoded runtime log line
    Line(String),
    /// End of a progress stream
    Done,
    /// Graceful end of a raw-log stream
    End,
}

impl WireMessage {
    /// Inline error line for a raw-log stream that has already started
    pub fn error_line(message: impl std::fmt::Display) -> Self {
        WireMessage::Line(format!("[error] {}", message))
    }

    pub fn is_closing(&self) -> bool {
        matches!(self, WireMessage::Done | WireMessage::End)
    }

    /// Payload carried in the `data:` field
    pub fn data(&self) -> Result<String, PipelineError> {
        Ok(match self {
            WireMessage::Event(event) => serde_json::to_string(event)?,
            WireMessage::Line(line) => line.clone(),
            WireMessage::Done => DONE_SENTINEL.to_string(),
            WireMessage::End => String::new(),
        })
    }

    /// Convert to an axum SSE event
    ///
    /// SSE field values cannot carry carriage returns, so stray `\r` bytes
    /// from runtime output are dropped.
    pub fn to_sse(&self) -> Result<Event, PipelineError> {
        let event = Event::default().data(self.data()?.replace('\r', ""));
        Ok(match self {
            WireMessage::End => event.event(END_EVENT),
            _ => event,
        })
    }

    /// Text framing of this message, as written on the connection
    pub fn encode(&self) -> Result<String, PipelineError> {
        let data = self.data()?;
        let mut out = String::new();
        if matches!(self, WireMessage::End) {
            out.push_str("event: ");
            out.push_str(END_EVENT);
            out.push('\n');
        }
        for line in data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        Ok(out)
    }
}
