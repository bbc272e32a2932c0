//! Periodic reconciliation worker

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{error, info};

use crate::reconcile::Reconciler;

/// Reconciler worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Time between passes
    pub interval: Duration,

    /// Grace delay after startup so the runtime can settle
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            initial_delay: Duration::from_secs(10),
        }
    }
}

/// Run the reconciler worker until `shutdown_signal` resolves
///
/// A failed pass is logged and retried on the next tick.
pub async fn run<S, F>(
    options: &Options,
    reconciler: &Reconciler,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Reconciler worker starting...");

    let mut wait = options.initial_delay;
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Reconciler worker shutting down...");
                return;
            }
            _ = sleep_fn(wait) => {}
        }
        wait = options.interval;

        match reconciler.reconcile().await {
            Ok(report) => info!(
                total = report.total,
                healthy = report.healthy,
                recovered = report.recovered,
                lost = report.lost,
                cleaned = report.cleaned,
                "Reconciliation pass complete"
            ),
            Err(e) => error!("Reconciliation pass failed: {}", e),
        }
    }
}
