//! Container runtime access

pub mod docker;
pub mod frames;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::errors::PipelineError;
use crate::models::resource::ContainerState;

pub use docker::DockerRuntime;

/// Raw multiplexed log bytes as they arrive from the runtime
pub type LogByteStream = BoxStream<'static, Result<Bytes, PipelineError>>;

/// Options for a follow-mode log query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    /// Only return this many lines of history before following
    pub tail: Option<u32>,

    /// Prefix every line with the runtime's timestamp
    pub timestamps: bool,
}

/// Container runtime trait for testability
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List every container, running or not
    async fn list_containers(&self) -> Result<Vec<ContainerState>, PipelineError>;

    /// Open a follow-mode log connection
    ///
    /// Dropping the returned stream closes the upstream connection.
    async fn follow_logs(
        &self,
        container_id: &str,
        query: &LogQuery,
    ) -> Result<LogByteStream, PipelineError>;

    /// Force-remove a container. Removing a container that is already gone succeeds.
    async fn remove_container(&self, container_id: &str) -> Result<(), PipelineError>;
}
