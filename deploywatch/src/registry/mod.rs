//! Resource registry: the persisted belief about which resources should be running

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::PipelineError;
use crate::models::resource::ResourceRecord;

pub use file::FileRegistry;
pub use memory::MemoryRegistry;

/// Registry backend, shared by request handlers and the reconciliation loop
#[async_trait]
pub trait ResourceRegistry: Send + Sync {
    /// Every record, ordered by resource id
    async fn list(&self) -> Result<Vec<ResourceRecord>, PipelineError>;

    async fn get(&self, resource_id: &str) -> Result<Option<ResourceRecord>, PipelineError>;

    /// Insert or replace the record keyed by its resource id
    async fn upsert(&self, record: ResourceRecord) -> Result<(), PipelineError>;

    /// Remove a record, returning whether it existed
    async fn remove(&self, resource_id: &str) -> Result<bool, PipelineError>;

    /// Store `record` only if nobody changed it since the caller read it
    ///
    /// `expected` is the `updated_at` of the copy the caller read, or `None`
    /// when the caller saw no record at all. Returns whether the write landed.
    async fn replace_if_unchanged(
        &self,
        record: ResourceRecord,
        expected: Option<DateTime<Utc>>,
    ) -> Result<bool, PipelineError>;

    /// Remove a record only if its `updated_at` still equals `expected`
    async fn remove_if_unchanged(
        &self,
        resource_id: &str,
        expected: DateTime<Utc>,
    ) -> Result<bool, PipelineError>;
}

/// Whether the stored copy is the one a caller read
pub(crate) fn unchanged(current: Option<&ResourceRecord>, expected: Option<DateTime<Utc>>) -> bool {
    current.map(|record| record.updated_at) == expected
}

/// Read-modify-write attempts before giving up with a conflict
const MODIFY_ATTEMPTS: usize = 5;

/// Outcome of [`modify_record`]
#[derive(Debug, Clone)]
pub struct Modified {
    pub record: ResourceRecord,
    /// No record existed before
    pub created: bool,
}

/// Apply `change` to one record without losing concurrent writes
///
/// `change` receives the current record, if any, and returns the record to
/// store or `None` to leave the registry alone. The write only lands when
/// the record is unchanged since it was read; otherwise `change` runs again
/// on the fresh copy.
pub async fn modify_record<R, F>(
    registry: &R,
    resource_id: &str,
    mut change: F,
) -> Result<Option<Modified>, PipelineError>
where
    R: ResourceRegistry + ?Sized,
    F: FnMut(Option<ResourceRecord>) -> Option<ResourceRecord>,
{
    for attempt in 0..MODIFY_ATTEMPTS {
        let current = registry.get(resource_id).await?;
        let expected = current.as_ref().map(|record| record.updated_at);
        let created = current.is_none();

        let mut record = match change(current) {
            Some(record) => record,
            None => return Ok(None),
        };
        if let Some(previous) = expected {
            record.updated_at = previous;
        }
        record.touch();

        if registry
            .replace_if_unchanged(record.clone(), expected)
            .await?
        {
            return Ok(Some(Modified { record, created }));
        }
        debug!("Record {} changed concurrently (attempt {})", resource_id, attempt + 1);
    }

    Err(PipelineError::Conflict(format!(
        "resource {} kept changing, giving up",
        resource_id
    )))
}
