//! Client-side observation of a deployment
//!
//! A UI (or the `--watch` command) subscribes to a resource's progress
//! stream through a [`ProgressTracker`] and reads back [`ActiveDeploy`]
//! snapshots.

pub mod sse;
pub mod state;
pub mod tracker;

pub use state::{next_status, ActiveDeploy, DeployStatus};
pub use tracker::{HttpProgressSource, ProgressSource, ProgressTracker, TrackerOptions};
