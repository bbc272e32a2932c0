//! Incremental Server-Sent Events decoder

use tracing::debug;

/// One dispatched SSE message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseMessage {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Longest line the decoder buffers before discarding it
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// Turns arbitrary byte chunks into complete SSE messages
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Unterminated tail of the previous chunks
    partial: Vec<u8>,
    /// Dropping an oversized line until its newline arrives
    skipping: bool,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every message it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        let mut messages = Vec::new();
        let mut rest = chunk;

        // only the new bytes are scanned; `partial` never holds a newline
        while let Some(newline) = rest.iter().position(|b| *b == b'\n') {
            let head = &rest[..newline];
            rest = &rest[newline + 1..];

            if self.skipping {
                self.skipping = false;
                continue;
            }
            if self.partial.len() + head.len() > MAX_LINE_LEN {
                debug!("Dropping SSE line over {} bytes", MAX_LINE_LEN);
                self.partial.clear();
                continue;
            }
            if self.partial.is_empty() {
                self.handle_line(head, &mut messages);
            } else {
                let mut line = std::mem::take(&mut self.partial);
                line.extend_from_slice(head);
                self.handle_line(&line, &mut messages);
            }
        }

        if !self.skipping {
            if self.partial.len() + rest.len() > MAX_LINE_LEN {
                debug!("Dropping SSE line over {} bytes", MAX_LINE_LEN);
                self.partial = Vec::new();
                self.skipping = true;
            } else {
                self.partial.extend_from_slice(rest);
            }
        }

        messages
    }

    fn handle_line(&mut self, raw: &[u8], messages: &mut Vec<SseMessage>) {
        let decoded = String::from_utf8_lossy(raw);
        let line = decoded.strip_suffix('\r').unwrap_or(decoded.as_ref());

        if line.is_empty() {
            if let Some(message) = self.dispatch() {
                messages.push(message);
            }
            return;
        }
        if line.starts_with(':') {
            // comment / keep-alive
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseMessage { event, data })
    }
}
