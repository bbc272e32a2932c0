//! JSON file registry
//!
//! The whole registry is one JSON array rewritten atomically on every
//! change. Fine for the few dozen resources a single host runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::PipelineError;
use crate::filesys::file::File;
use crate::models::resource::ResourceRecord;
use crate::registry::{unchanged, ResourceRegistry};

pub struct FileRegistry {
    file: File,
    /// Guards read-modify-write cycles
    lock: Mutex<()>,
}

impl FileRegistry {
    pub fn new(file: File) -> Self {
        Self {
            file,
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<ResourceRecord>, PipelineError> {
        let contents = self.file.read_string_opt().await.map_err(registry_error)?;
        let mut records: Vec<ResourceRecord> = match contents {
            Some(contents) if !contents.trim().is_empty() => serde_json::from_str(&contents)?,
            _ => Vec::new(),
        };
        records.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        Ok(records)
    }

    async fn store(&self, records: &[ResourceRecord]) -> Result<(), PipelineError> {
        debug!("Writing {} registry records to {:?}", records.len(), self.file.path());
        self.file.write_json(&records).await.map_err(registry_error)
    }
}

fn registry_error(e: PipelineError) -> PipelineError {
    PipelineError::RegistryError(e.to_string())
}

#[async_trait]
impl ResourceRegistry for FileRegistry {
    async fn list(&self) -> Result<Vec<ResourceRecord>, PipelineError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn get(&self, resource_id: &str) -> Result<Option<ResourceRecord>, PipelineError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|r| r.resource_id == resource_id))
    }

    async fn upsert(&self, record: ResourceRecord) -> Result<(), PipelineError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        match records
            .iter_mut()
            .find(|r| r.resource_id == record.resource_id)
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.store(&records).await
    }

    async fn remove(&self, resource_id: &str) -> Result<bool, PipelineError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|r| r.resource_id != resource_id);
        if records.len() == before {
            return Ok(false);
        }
        self.store(&records).await?;
        Ok(true)
    }

    async fn replace_if_unchanged(
        &self,
        record: ResourceRecord,
        expected: Option<DateTime<Utc>>,
    ) -> Result<bool, PipelineError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let position = records
            .iter()
            .position(|r| r.resource_id == record.resource_id);
        if !unchanged(position.map(|i| &records[i]), expected) {
            return Ok(false);
        }
        match position {
            Some(i) => records[i] = record,
            None => records.push(record),
        }
        self.store(&records).await?;
        Ok(true)
    }

    async fn remove_if_unchanged(
        &self,
        resource_id: &str,
        expected: DateTime<Utc>,
    ) -> Result<bool, PipelineError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let position = records.iter().position(|r| r.resource_id == resource_id);
        match position {
            Some(i) if records[i].updated_at == expected => {
                records.remove(i);
                self.store(&records).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
