//! Error types for the deployment observability pipeline

use thiserror::Error;

/// Main error type for deploywatch
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The container runtime could not be reached or answered with a failure
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// The resource registry could not be read or written
    #[error("Registry error: {0}")]
    RegistryError(String),

    /// The progress event store is transiently unavailable
    #[error("Event log unavailable: {0}")]
    EventLogUnavailable(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A conditional write kept losing to concurrent writers
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Transport-class failures that are worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::EventLogUnavailable(_)
                | PipelineError::RuntimeError(_)
                | PipelineError::RegistryError(_)
                | PipelineError::HttpError(_)
                | PipelineError::IoError(_)
        )
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Internal(err.to_string())
    }
}
