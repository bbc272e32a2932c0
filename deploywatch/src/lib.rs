//! deploywatch library
//!
//! Deployment observability pipeline: progress event logs, live stream
//! tailers over SSE, runtime log demultiplexing, registry reconciliation and
//! the client-side progress tracker.

pub mod app;
pub mod client;
pub mod errors;
pub mod eventlog;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod reconcile;
pub mod registry;
pub mod runtime;
pub mod server;
pub mod storage;
pub mod stream;
pub mod utils;
pub mod workers;
