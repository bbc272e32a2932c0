//! Client-side deployment state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::event::{EventType, ProgressEvent};

/// Status shown for a deployment being observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    InProgress,
    Complete,
    Error,
}

impl DeployStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployStatus::Complete | DeployStatus::Error)
    }
}

/// Terminal status non-regression rule
///
/// Once a deployment has reached `complete` or `error` its status never
/// changes again, whatever arrives afterwards (a delayed `minting_identity`,
/// say). Otherwise a terminal event sets the matching status and any other
/// event means the deployment is in progress.
pub fn next_status(current: DeployStatus, event: EventType) -> DeployStatus {
    if current.is_terminal() {
        return current;
    }
    match event {
        EventType::Complete => DeployStatus::Complete,
        EventType::Error => DeployStatus::Error,
        _ => DeployStatus::InProgress,
    }
}

/// One deployment as seen by a subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDeploy {
    pub resource_id: String,
    pub resource_name: String,
    /// Every received event, in arrival order
    pub events: Vec<ProgressEvent>,
    pub status: DeployStatus,
    pub started_at: DateTime<Utc>,
}

impl ActiveDeploy {
    pub fn new(resource_id: impl Into<String>, resource_name: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_name: resource_name.into(),
            events: Vec::new(),
            status: DeployStatus::InProgress,
            started_at: Utc::now(),
        }
    }

    /// Record one received event
    pub fn apply(&mut self, event: ProgressEvent) {
        if self.resource_name.is_empty() {
            if let Some(name) = &event.resource_name {
                self.resource_name = name.clone();
            }
        }
        self.status = next_status(self.status, event.event_type);
        self.events.push(event);
    }

    pub fn last_event(&self) -> Option<&ProgressEvent> {
        self.events.last()
    }
}
