//! Demultiplexer for the container runtime's stdout/stderr log stream
//!
//! When a container runs without a TTY the runtime multiplexes both output
//! streams onto one connection. Every frame starts with an 8-byte header:
//!
//! ```text
//! [tag, 0, 0, 0, len_be[0], len_be[1], len_be[2], len_be[3]] payload...
//! ```
//!
//! `tag` is 1 for stdout and 2 for stderr (0, stdin, is folded into stdout).
//! The decoder is best-effort: it never errors, and input that does not look
//! multiplexed degrades to raw text passthrough.
//!
//! Memory use is bounded. At most a partial header (under 8 bytes) and a
//! partial UTF-8 sequence (under 4 bytes) are carried between chunks. Payload
//! bytes are flushed as soon as they arrive, even when the frame is not yet
//! complete, so a single log line can be delivered in two pieces when a chunk
//! boundary lands inside it. That imprecision is accepted to avoid buffering
//! whole frames; the concatenated output is the same for every chunking.

use bytes::Bytes;

/// Size of a multiplexed frame header
pub const HEADER_LEN: usize = 8;

/// Which output stream a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 | 1 => Some(StreamKind::Stdout),
            2 => Some(StreamKind::Stderr),
            _ => None,
        }
    }
}

/// One decoded unit of the multiplexed stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFrame {
    pub stream: StreamKind,
    pub payload: Bytes,
}

/// Streaming decoder for one log session
#[derive(Debug, Default)]
pub struct FrameDemuxer {
    header: [u8; HEADER_LEN],
    header_len: usize,
    /// Stream and number of payload bytes still owed by the current frame
    pending: Option<(StreamKind, usize)>,
    /// Set once the input stops looking multiplexed
    raw: bool,
    utf8_tail: Vec<u8>,
}

impl FrameDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the decoder has fallen back to raw passthrough
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Feed one chunk and return every frame fragment recoverable so far
    pub fn push(&mut self, chunk: &[u8]) -> Vec<LogFrame> {
        let mut frames = Vec::new();

        if self.raw {
            if !chunk.is_empty() {
                frames.push(raw_frame(chunk.to_vec()));
            }
            return frames;
        }

        let mut pos = 0;
        while pos < chunk.len() {
            if let Some((stream, remaining)) = self.pending {
                let take = remaining.min(chunk.len() - pos);
                frames.push(LogFrame {
                    stream,
                    payload: Bytes::copy_from_slice(&chunk[pos..pos + take]),
                });
                pos += take;
                self.pending = match remaining - take {
                    0 => None,
                    left => Some((stream, left)),
                };
                continue;
            }

            let take = (HEADER_LEN - self.header_len).min(chunk.len() - pos);
            self.header[self.header_len..self.header_len + take]
                .copy_from_slice(&chunk[pos..pos + take]);
            self.header_len += take;
            pos += take;

            if !header_prefix_valid(&self.header[..self.header_len]) {
                self.raw = true;
                let mut raw = self.header[..self.header_len].to_vec();
                raw.extend_from_slice(&chunk[pos..]);
                self.header_len = 0;
                frames.push(raw_frame(raw));
                return frames;
            }

            if self.header_len == HEADER_LEN {
                self.header_len = 0;
                let len = u32::from_be_bytes([
                    self.header[4],
                    self.header[5],
                    self.header[6],
                    self.header[7],
                ]) as usize;
                // header_prefix_valid already vetted the tag
                let stream = StreamKind::from_tag(self.header[0]).unwrap_or(StreamKind::Stdout);
                if len > 0 {
                    self.pending = Some((stream, len));
                }
            }
        }

        frames
    }

    /// Feed one chunk and return the decoded text recoverable so far
    pub fn push_text(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        for frame in self.push(chunk) {
            bytes.extend_from_slice(&frame.payload);
        }
        self.decode_utf8(bytes)
    }

    /// Flush whatever is still buffered once the upstream stream has ended
    ///
    /// A trailing partial header is surfaced as raw text: a bounded log
    /// query may legitimately stop in the middle of a frame.
    pub fn finish(&mut self) -> String {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(&self.header[..self.header_len]);
        self.header_len = 0;
        self.pending = None;
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn decode_utf8(&mut self, bytes: Vec<u8>) -> String {
        let mut text = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    return text;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // incomplete sequence at the end, keep it for the next chunk
                            self.utf8_tail = after.to_vec();
                            return text;
                        }
                    }
                }
            }
        }
    }
}

fn raw_frame(bytes: Vec<u8>) -> LogFrame {
    LogFrame {
        stream: StreamKind::Stdout,
        payload: Bytes::from(bytes),
    }
}

fn header_prefix_valid(prefix: &[u8]) -> bool {
    prefix.iter().enumerate().all(|(i, b)| match i {
        0 => StreamKind::from_tag(*b).is_some(),
        1..=3 => *b == 0,
        _ => true,
    })
}

/// Decode a complete buffer in one shot
pub fn demux(bytes: &[u8]) -> String {
    let mut demuxer = FrameDemuxer::new();
    let mut text = demuxer.push_text(bytes);
    text.push_str(&demuxer.finish());
    text
}

/// Split decoded text into the non-empty lines relayed to clients
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
}

/// Encode one frame, used by tests and fake runtimes
pub fn encode_frame(stream: StreamKind, payload: &[u8]) -> Vec<u8> {
    let tag = match stream {
        StreamKind::Stdout => 1,
        StreamKind::Stderr => 2,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&[tag, 0, 0, 0]);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}
