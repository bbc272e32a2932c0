//! Registry and runtime models used by reconciliation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last known health of a resource, as recorded in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceHealth {
    #[default]
    Unknown,
    Running,
    Lost,
    /// Deleted upstream, waiting to be cleaned out of the registry
    Deleted,
}

/// The registry's belief about a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub resource_id: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Container the resource is expected to run in, if it was ever scheduled
    #[serde(default)]
    pub container_id: Option<String>,

    #[serde(default)]
    pub health: ResourceHealth,

    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn new(resource_id: impl Into<String>, container_id: Option<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            name: None,
            container_id,
            health: ResourceHealth::Unknown,
            updated_at: Utc::now(),
        }
    }

    pub fn with_health(mut self, health: ResourceHealth) -> Self {
        self.health = health;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Stamp a change; the new `updated_at` is always later than the old one
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
    }
}

/// The runtime's ground truth about one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub id: String,

    /// Primary container name, without the leading slash
    pub name: String,

    pub running: bool,
}

impl ContainerState {
    /// Whether `id_or_name` refers to this container
    ///
    /// Matches the full id, a short id prefix (12+ chars) or the name.
    pub fn matches(&self, id_or_name: &str) -> bool {
        self.id == id_or_name
            || self.name == id_or_name
            || (id_or_name.len() >= 12 && self.id.starts_with(id_or_name))
    }
}
