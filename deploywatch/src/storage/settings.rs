//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Service settings
///
/// Every field has a default so a partial (or empty) settings file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Directory for daily-rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerSettings,

    /// Container runtime connection
    #[serde(default)]
    pub runtime: RuntimeSettings,

    #[serde(default)]
    pub event_log: EventLogSettings,

    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub tailer: TailerSettings,

    #[serde(default)]
    pub reconciler: ReconcilerSettings,

    #[serde(default)]
    pub lifecycle: LifecycleSettings,
}

fn default_true() -> bool {
    true
}

/// Local HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Docker Engine API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default = "default_runtime_url")]
    pub base_url: String,

    /// Timeout for non-streaming runtime calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_runtime_url() -> String {
    "http://127.0.0.1:2375".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            base_url: default_runtime_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Which event log backend to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLogBackend {
    #[default]
    Memory,
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogSettings {
    #[serde(default)]
    pub backend: EventLogBackend,

    /// Directory of the JSON-lines backend; defaults to the layout's events dir
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Seconds a resource's events are kept after its last append
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

fn default_retention() -> u64 {
    600
}

impl Default for EventLogSettings {
    fn default() -> Self {
        Self {
            backend: EventLogBackend::default(),
            dir: None,
            retention_secs: default_retention(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// JSON registry file; the registry is in-memory when absent
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Stream tailer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailerSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_session_budget")]
    pub session_budget_secs: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: Option<u32>,

    #[serde(default)]
    pub log_timestamps: bool,
}

fn default_poll_interval() -> u64 {
    300
}

fn default_session_budget() -> u64 {
    120
}

fn default_max_backoff() -> u64 {
    5000
}

fn default_log_tail_lines() -> Option<u32> {
    Some(200)
}

impl Default for TailerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            session_budget_secs: default_session_budget(),
            max_backoff_ms: default_max_backoff(),
            log_tail_lines: default_log_tail_lines(),
            log_timestamps: false,
        }
    }
}

/// Reconciliation worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Wait after startup before the first pass
    #[serde(default = "default_grace_delay")]
    pub grace_delay_secs: u64,

    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,

    /// Name prefix of managed containers; orphan cleanup is off when unset
    #[serde(default)]
    pub container_prefix: Option<String>,
}

fn default_grace_delay() -> u64 {
    10
}

fn default_reconcile_interval() -> u64 {
    300
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_delay_secs: default_grace_delay(),
            interval_secs: default_reconcile_interval(),
            container_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSettings {
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_max_shutdown_delay() -> u64 {
    30
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}
