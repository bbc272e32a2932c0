//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::errors::PipelineError;
use crate::eventlog::{EventLog, JsonlEventLog, MemoryEventLog};
use crate::filesys::file::File;
use crate::reconcile::Reconciler;
use crate::registry::{FileRegistry, MemoryRegistry, ResourceRegistry};
use crate::runtime::{ContainerRuntime, DockerRuntime};
use crate::storage::settings::EventLogBackend;

/// Main application state
pub struct AppState {
    /// Progress event store
    pub event_log: Arc<dyn EventLog>,

    /// Which resources should be running
    pub registry: Arc<dyn ResourceRegistry>,

    /// Container runtime client
    pub runtime: Arc<dyn ContainerRuntime>,

    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Initialize application state from the configured backends
    pub async fn init(options: &AppOptions) -> Result<Self, PipelineError> {
        info!("Initializing application state...");

        let event_log: Arc<dyn EventLog> = match options.event_log.backend {
            EventLogBackend::Memory => {
                info!("Using in-memory event log");
                Arc::new(MemoryEventLog::new(options.event_log.retention))
            }
            EventLogBackend::Jsonl => {
                info!("Using JSON-lines event log at {:?}", options.event_log.dir);
                tokio::fs::create_dir_all(&options.event_log.dir).await?;
                Arc::new(JsonlEventLog::new(
                    options.event_log.dir.clone(),
                    options.event_log.retention,
                ))
            }
        };

        let registry: Arc<dyn ResourceRegistry> = match &options.registry_file {
            Some(path) => {
                info!("Using registry file {:?}", path);
                Arc::new(FileRegistry::new(File::new(path.clone())))
            }
            None => Arc::new(MemoryRegistry::new()),
        };

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::new(
            &options.runtime.base_url,
            options.runtime.request_timeout,
        )?);

        Ok(Self::new(event_log, registry, runtime, options))
    }

    /// Assemble state from already-built backends
    pub fn new(
        event_log: Arc<dyn EventLog>,
        registry: Arc<dyn ResourceRegistry>,
        runtime: Arc<dyn ContainerRuntime>,
        options: &AppOptions,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(
            registry.clone(),
            runtime.clone(),
            options.reconcile.clone(),
        ));
        Self {
            event_log,
            registry,
            runtime,
            reconciler,
        }
    }
}
