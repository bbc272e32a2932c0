//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::reconcile::ReconcileOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{EventLogBackend, Settings};
use crate::stream::TailerOptions;
use crate::utils::CooldownOptions;
use crate::workers::reconciler;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Local HTTP server
    pub server: ServerOptions,

    /// Container runtime connection
    pub runtime: RuntimeOptions,

    /// Progress event store
    pub event_log: EventLogOptions,

    /// Registry file; in-memory registry when `None`
    pub registry_file: Option<PathBuf>,

    /// Streaming session behaviour
    pub tailer: TailerOptions,

    /// Run the periodic reconciler worker
    pub enable_reconciler: bool,

    /// Reconciler worker timing
    pub reconciler_worker: reconciler::Options,

    /// Reconciliation behaviour
    pub reconcile: ReconcileOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions::default(),
            runtime: RuntimeOptions::default(),
            event_log: EventLogOptions::default(),
            registry_file: None,
            tailer: TailerOptions::default(),
            enable_reconciler: true,
            reconciler_worker: reconciler::Options::default(),
            reconcile: ReconcileOptions::default(),
        }
    }
}

impl AppOptions {
    /// Build options from a settings file, filling paths from `layout`
    pub fn from_settings(settings: &Settings, layout: &StorageLayout) -> Self {
        let tailer = TailerOptions {
            poll_interval: Duration::from_millis(settings.tailer.poll_interval_ms),
            session_budget: Duration::from_secs(settings.tailer.session_budget_secs),
            backoff: CooldownOptions {
                max_delay: Duration::from_millis(settings.tailer.max_backoff_ms),
                ..Default::default()
            },
            log_tail_lines: settings.tailer.log_tail_lines,
            log_timestamps: settings.tailer.log_timestamps,
        };

        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(
                    settings.lifecycle.max_shutdown_delay_secs,
                ),
            },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            runtime: RuntimeOptions {
                base_url: settings.runtime.base_url.clone(),
                request_timeout: Duration::from_secs(settings.runtime.request_timeout_secs),
            },
            event_log: EventLogOptions {
                backend: settings.event_log.backend,
                dir: settings
                    .event_log
                    .dir
                    .clone()
                    .unwrap_or_else(|| layout.events_dir()),
                retention: Duration::from_secs(settings.event_log.retention_secs),
            },
            registry_file: settings.registry.file.clone(),
            tailer,
            enable_reconciler: settings.reconciler.enabled,
            reconciler_worker: reconciler::Options {
                interval: Duration::from_secs(settings.reconciler.interval_secs),
                initial_delay: Duration::from_secs(settings.reconciler.grace_delay_secs),
            },
            reconcile: ReconcileOptions {
                container_prefix: settings.reconciler.container_prefix.clone(),
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Docker Engine API base URL
    pub base_url: String,

    pub request_timeout: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:2375".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventLogOptions {
    pub backend: EventLogBackend,

    /// Directory of the JSON-lines backend
    pub dir: PathBuf,

    /// How long a resource's events outlive its last append
    pub retention: Duration,
}

impl Default for EventLogOptions {
    fn default() -> Self {
        Self {
            backend: EventLogBackend::Memory,
            dir: StorageLayout::default().events_dir(),
            retention: Duration::from_secs(600),
        }
    }
}
