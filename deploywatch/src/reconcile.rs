//! Registry/runtime reconciliation
//!
//! Compares the registry's records against the runtime's live containers
//! after restarts, crashes or partitions, and corrects the registry. Every
//! record ends up in exactly one class:
//!
//! * `healthy`: registry says running and the container is running
//! * `recovered`: the container is running but the registry thought otherwise
//! * `lost`: the expected container is absent or exited (kept for visibility)
//! * `cleaned`: deleted upstream, removed along with its container
//!
//! Containers carrying the managed name prefix that no record claims are
//! removed and also counted as `cleaned`.
//!
//! Corrections are conditional writes against the snapshot the pass listed.
//! A record changed by a handler mid-pass, or one whose correction could
//! not be written, is left uncounted and picked up by the next pass.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::PipelineError;
use crate::models::resource::{ContainerState, ResourceHealth, ResourceRecord};
use crate::registry::ResourceRegistry;
use crate::runtime::ContainerRuntime;

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub total: usize,
    pub healthy: usize,
    pub recovered: usize,
    pub lost: usize,
    pub cleaned: usize,
}

impl ReconcileReport {
    fn record(&mut self, class: Classification) {
        match class {
            Classification::Healthy => self.healthy += 1,
            Classification::Recovered => self.recovered += 1,
            Classification::Lost => self.lost += 1,
            Classification::Cleaned => self.cleaned += 1,
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Healthy,
    Recovered,
    Lost,
    Cleaned,
}

/// Classify one registry record against the live container set
pub fn classify<'a>(
    record: &ResourceRecord,
    containers: &'a [ContainerState],
) -> (Classification, Option<&'a ContainerState>) {
    if record.health == ResourceHealth::Deleted {
        return (Classification::Cleaned, find_container(record, containers));
    }

    match find_container(record, containers) {
        Some(container) if container.running => {
            if record.health == ResourceHealth::Running {
                (Classification::Healthy, Some(container))
            } else {
                (Classification::Recovered, Some(container))
            }
        }
        container => (Classification::Lost, container),
    }
}

fn find_container<'a>(
    record: &ResourceRecord,
    containers: &'a [ContainerState],
) -> Option<&'a ContainerState> {
    let expected = record.container_id.as_deref()?;
    containers.iter().find(|c| c.matches(expected))
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Name prefix of containers this system manages; enables orphan cleanup
    pub container_prefix: Option<String>,
}

pub struct Reconciler {
    registry: Arc<dyn ResourceRegistry>,
    runtime: Arc<dyn ContainerRuntime>,
    options: ReconcileOptions,
    /// One pass at a time, whether timer- or operator-triggered
    pass: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        registry: Arc<dyn ResourceRegistry>,
        runtime: Arc<dyn ContainerRuntime>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            registry,
            runtime,
            options,
            pass: Mutex::new(()),
        }
    }

    /// Run one reconciliation pass
    ///
    /// Fails only when the registry or runtime cannot be listed; failures to
    /// write back individual corrections are logged and the pass continues.
    pub async fn reconcile(&self) -> Result<ReconcileReport, PipelineError> {
        let _pass = self.pass.lock().await;

        let records = self.registry.list().await?;
        let containers = self.runtime.list_containers().await?;
        debug!(
            "Reconciling {} registry records against {} containers",
            records.len(),
            containers.len()
        );

        let mut report = ReconcileReport::default();
        let mut claimed: HashSet<String> = HashSet::new();

        for record in records {
            let (class, container) = classify(&record, &containers);
            if let Some(container) = container {
                claimed.insert(container.id.clone());
            }

            // a record changed by someone else mid-pass is left for the next pass
            let settled = match class {
                Classification::Healthy => true,
                Classification::Recovered => {
                    info!("Resource {} recovered", record.resource_id);
                    self.update_health(record, ResourceHealth::Running).await
                }
                Classification::Lost => {
                    if record.health == ResourceHealth::Lost {
                        true
                    } else {
                        warn!(
                            "Resource {} lost its container {:?}",
                            record.resource_id, record.container_id
                        );
                        self.update_health(record, ResourceHealth::Lost).await
                    }
                }
                Classification::Cleaned => {
                    let removed = self
                        .registry
                        .remove_if_unchanged(&record.resource_id, record.updated_at)
                        .await;
                    match removed {
                        Ok(true) => {
                            info!("Cleaned deleted resource {}", record.resource_id);
                            if let Some(container) = container {
                                self.remove_container(&container.id).await;
                            }
                            true
                        }
                        Ok(false) => {
                            debug!("Resource {} changed before cleanup", record.resource_id);
                            false
                        }
                        Err(e) => {
                            warn!("Failed to remove record {}: {}", record.resource_id, e);
                            false
                        }
                    }
                }
            };

            if settled {
                report.record(class);
            }
        }

        if let Some(prefix) = &self.options.container_prefix {
            for container in containers
                .iter()
                .filter(|c| c.name.starts_with(prefix.as_str()) && !claimed.contains(&c.id))
            {
                info!("Removing orphaned container {} ({})", container.name, container.id);
                if self.remove_container(&container.id).await {
                    report.record(Classification::Cleaned);
                }
            }
        }

        info!(
            "Reconciliation complete: total={} healthy={} recovered={} lost={} cleaned={}",
            report.total, report.healthy, report.recovered, report.lost, report.cleaned
        );
        Ok(report)
    }

    /// Write a corrected health unless the record changed since it was listed
    async fn update_health(&self, record: ResourceRecord, health: ResourceHealth) -> bool {
        let resource_id = record.resource_id.clone();
        let expected = record.updated_at;
        let mut corrected = record.with_health(health);
        corrected.touch();
        match self
            .registry
            .replace_if_unchanged(corrected, Some(expected))
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                debug!("Resource {} changed during the pass, skipping", resource_id);
                false
            }
            Err(e) => {
                warn!("Failed to update record {}: {}", resource_id, e);
                false
            }
        }
    }

    async fn remove_container(&self, container_id: &str) -> bool {
        match self.runtime.remove_container(container_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to remove container {}: {}", container_id, e);
                false
            }
        }
    }
}
