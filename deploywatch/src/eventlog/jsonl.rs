//! Directory-backed event log shared with the deploy worker
//!
//! Each resource owns `<dir>/<resource_id>.jsonl`, one JSON-encoded
//! [`ProgressEvent`] per line. Writers may live in another process; only
//! newline-terminated lines are visible to readers, so a half-written entry
//! is picked up on a later poll instead of being misread. Lines that do not
//! parse are skipped and do not occupy a cursor position.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::eventlog::EventLog;
use crate::filesys::file::File;
use crate::models::event::ProgressEvent;

pub struct JsonlEventLog {
    dir: PathBuf,
    retention: Duration,
    /// Serialises in-process appends so returned positions are exact
    append_lock: Mutex<()>,
}

impl JsonlEventLog {
    pub fn new(dir: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            dir: dir.into(),
            retention,
            append_lock: Mutex::new(()),
        }
    }

    fn file(&self, resource_id: &str) -> File {
        File::new(self.dir.join(format!("{}.jsonl", file_stem(resource_id))))
    }

    async fn is_expired(&self, file: &File) -> Result<bool, PipelineError> {
        Ok(file.age().await?.is_some_and(|age| age >= self.retention))
    }

    async fn load(&self, resource_id: &str) -> Result<Vec<ProgressEvent>, PipelineError> {
        let file = self.file(resource_id);
        let unavailable = |e: PipelineError| PipelineError::EventLogUnavailable(e.to_string());

        if self.is_expired(&file).await.map_err(unavailable)? {
            return Ok(Vec::new());
        }

        let contents = match file.read_string_opt().await.map_err(unavailable)? {
            Some(contents) => contents,
            None => return Ok(Vec::new()),
        };

        Ok(parse_complete_lines(resource_id, &contents))
    }
}

#[async_trait]
impl EventLog for JsonlEventLog {
    async fn append(&self, resource_id: &str, event: ProgressEvent) -> Result<u64, PipelineError> {
        let _guard = self.append_lock.lock().await;
        let file = self.file(resource_id);
        let unavailable = |e: PipelineError| PipelineError::EventLogUnavailable(e.to_string());

        if self.is_expired(&file).await.map_err(unavailable)? {
            debug!("Event log for {} expired, starting a new one", resource_id);
            file.delete().await.map_err(unavailable)?;
        }

        let contents = file
            .read_string_opt()
            .await
            .map_err(unavailable)?
            .unwrap_or_default();
        let position = parse_complete_lines(resource_id, &contents).len() as u64;

        let mut line = Vec::new();
        if !contents.is_empty() && !contents.ends_with('\n') {
            // terminate a torn write so the new event starts on its own line
            line.push(b'\n');
        }
        serde_json::to_writer(&mut line, &event)?;
        line.push(b'\n');
        file.append_bytes(&line).await.map_err(unavailable)?;

        Ok(position)
    }

    async fn read(
        &self,
        resource_id: &str,
        cursor: u64,
    ) -> Result<Vec<ProgressEvent>, PipelineError> {
        let events = self.load(resource_id).await?;
        Ok(events.into_iter().skip(cursor as usize).collect())
    }
}

fn parse_complete_lines(resource_id: &str, contents: &str) -> Vec<ProgressEvent> {
    // anything after the last newline is still being written
    let complete = match contents.rfind('\n') {
        Some(end) => &contents[..end],
        None => return Vec::new(),
    };

    complete
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<ProgressEvent>(line) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Skipping malformed event for {}: {}", resource_id, e);
                None
            }
        })
        .collect()
}

/// File name for a resource id
///
/// Bytes outside `[A-Za-z0-9-]` are written as `_xx` (lowercase hex), so
/// distinct ids never share a file and `_` only ever starts an escape.
fn file_stem(resource_id: &str) -> String {
    let mut stem = String::with_capacity(resource_id.len());
    for b in resource_id.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => stem.push(b as char),
            _ => stem.push_str(&format!("_{:02x}", b)),
        }
    }
    stem
}
