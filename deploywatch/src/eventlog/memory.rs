//! In-memory event log

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::PipelineError;
use crate::eventlog::EventLog;
use crate::models::event::ProgressEvent;

struct ResourceLog {
    events: Vec<ProgressEvent>,
    last_append: Instant,
}

/// Process-local event log with bounded retention
///
/// A resource's events are dropped once `retention` has passed since its
/// last append.
pub struct MemoryEventLog {
    logs: RwLock<HashMap<String, ResourceLog>>,
    retention: Duration,
}

impl MemoryEventLog {
    pub fn new(retention: Duration) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Drop every expired resource log, returning how many were removed
    pub fn prune(&self) -> usize {
        let mut logs = self.logs.write().unwrap_or_else(|e| e.into_inner());
        let before = logs.len();
        let retention = self.retention;
        logs.retain(|_, log| log.last_append.elapsed() < retention);
        let removed = before - logs.len();
        if removed > 0 {
            debug!("Pruned {} expired event logs", removed);
        }
        removed
    }

    /// Number of resources with a live log
    pub fn len(&self) -> usize {
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, resource_id: &str, event: ProgressEvent) -> Result<u64, PipelineError> {
        self.prune();

        let mut logs = self.logs.write().unwrap_or_else(|e| e.into_inner());
        let log = logs
            .entry(resource_id.to_string())
            .or_insert_with(|| ResourceLog {
                events: Vec::new(),
                last_append: Instant::now(),
            });
        log.events.push(event);
        log.last_append = Instant::now();
        Ok(log.events.len() as u64 - 1)
    }

    async fn read(
        &self,
        resource_id: &str,
        cursor: u64,
    ) -> Result<Vec<ProgressEvent>, PipelineError> {
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        let events = match logs.get(resource_id) {
            Some(log) if log.last_append.elapsed() < self.retention => log
                .events
                .iter()
                .skip(cursor as usize)
                .cloned()
                .collect(),
            _ => Vec::new(),
        };
        Ok(events)
    }
}
