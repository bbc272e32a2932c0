//! Progress event log
//!
//! An append-only, per-resource sequence of [`ProgressEvent`]s. The external
//! deploy worker appends; any number of stream tailers read from their own
//! cursor. A cursor is the zero-based position of the next event a reader
//! has not seen yet.

pub mod jsonl;
pub mod memory;

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::models::event::ProgressEvent;

pub use jsonl::JsonlEventLog;
pub use memory::MemoryEventLog;

/// Event log backend, safe to share between tailer sessions
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Record `event` at the next position for `resource_id` and return that position
    async fn append(&self, resource_id: &str, event: ProgressEvent) -> Result<u64, PipelineError>;

    /// Every event at or after `cursor`, in append order
    ///
    /// A transiently unavailable store yields
    /// [`PipelineError::EventLogUnavailable`], never an empty batch.
    async fn read(&self, resource_id: &str, cursor: u64)
        -> Result<Vec<ProgressEvent>, PipelineError>;

    /// Whether any event has been recorded for `resource_id`
    async fn contains(&self, resource_id: &str) -> Result<bool, PipelineError> {
        Ok(!self.read(resource_id, 0).await?.is_empty())
    }
}
