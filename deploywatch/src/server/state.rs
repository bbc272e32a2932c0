//! Server state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::eventlog::EventLog;
use crate::reconcile::Reconciler;
use crate::registry::ResourceRegistry;
use crate::runtime::ContainerRuntime;
use crate::stream::TailerOptions;

/// Server state shared across handlers
pub struct ServerState {
    pub event_log: Arc<dyn EventLog>,
    pub registry: Arc<dyn ResourceRegistry>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub reconciler: Arc<Reconciler>,
    pub tailer: TailerOptions,
    /// Parent of every streaming session's token; cancelled on shutdown
    pub shutdown: CancellationToken,
}

impl ServerState {
    pub fn new(
        event_log: Arc<dyn EventLog>,
        registry: Arc<dyn ResourceRegistry>,
        runtime: Arc<dyn ContainerRuntime>,
        reconciler: Arc<Reconciler>,
        tailer: TailerOptions,
    ) -> Self {
        Self {
            event_log,
            registry,
            runtime,
            reconciler,
            tailer,
            shutdown: CancellationToken::new(),
        }
    }
}
