//! In-memory registry

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::PipelineError;
use crate::models::resource::ResourceRecord;
use crate::registry::{unchanged, ResourceRegistry};

#[derive(Default)]
pub struct MemoryRegistry {
    records: RwLock<BTreeMap<String, ResourceRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with `records`
    pub fn with_records(records: impl IntoIterator<Item = ResourceRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.resource_id.clone(), r))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl ResourceRegistry for MemoryRegistry {
    async fn list(&self) -> Result<Vec<ResourceRecord>, PipelineError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn get(&self, resource_id: &str) -> Result<Option<ResourceRecord>, PipelineError> {
        Ok(self.records.read().await.get(resource_id).cloned())
    }

    async fn upsert(&self, record: ResourceRecord) -> Result<(), PipelineError> {
        self.records
            .write()
            .await
            .insert(record.resource_id.clone(), record);
        Ok(())
    }

    async fn remove(&self, resource_id: &str) -> Result<bool, PipelineError> {
        Ok(self.records.write().await.remove(resource_id).is_some())
    }

    async fn replace_if_unchanged(
        &self,
        record: ResourceRecord,
        expected: Option<DateTime<Utc>>,
    ) -> Result<bool, PipelineError> {
        let mut records = self.records.write().await;
        if !unchanged(records.get(&record.resource_id), expected) {
            return Ok(false);
        }
        records.insert(record.resource_id.clone(), record);
        Ok(true)
    }

    async fn remove_if_unchanged(
        &self,
        resource_id: &str,
        expected: DateTime<Utc>,
    ) -> Result<bool, PipelineError> {
        let mut records = self.records.write().await;
        if !unchanged(records.get(resource_id), Some(expected)) {
            return Ok(false);
        }
        records.remove(resource_id);
        Ok(true)
    }
}
