//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::PipelineError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::reconciler;

/// Run the service until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PipelineError> {
    info!("Initializing deploywatch...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    let app_state = match AppState::init(&options).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            return Err(e);
        }
    };

    if let Err(e) = start(app_state, &options, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start deploywatch: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

/// Start the server and workers on prepared state
pub async fn start(
    app_state: Arc<AppState>,
    options: &AppOptions,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), PipelineError> {
    shutdown_manager.with_app_state(app_state.clone())?;

    init_socket_server(options, app_state.clone(), shutdown_manager, shutdown_tx.subscribe())
        .await?;

    if options.enable_reconciler {
        init_reconciler_worker(
            options.reconciler_worker.clone(),
            app_state,
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    Ok(())
}

// =============================== INITIALIZATION ================================== //

fn init_reconciler_worker(
    options: reconciler::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PipelineError> {
    info!("Initializing reconciler worker...");

    let engine = app_state.reconciler.clone();

    let handle = tokio::spawn(async move {
        reconciler::run(
            &options,
            engine.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_reconciler_worker_handle(handle)
}

async fn init_socket_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PipelineError> {
    info!("Initializing HTTP server...");

    let server_state = ServerState::new(
        app_state.event_log.clone(),
        app_state.registry.clone(),
        app_state.runtime.clone(),
        app_state.reconciler.clone(),
        options.tailer.clone(),
    );

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_socket_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

pub struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    socket_server_handle: Option<JoinHandle<Result<(), PipelineError>>>,
    reconciler_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            socket_server_handle: None,
            reconciler_worker_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), PipelineError> {
        if self.app_state.is_some() {
            return Err(PipelineError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_reconciler_worker_handle(
        &mut self,
        handle: JoinHandle<()>,
    ) -> Result<(), PipelineError> {
        if self.reconciler_worker_handle.is_some() {
            return Err(PipelineError::ShutdownError(
                "reconciler_handle already set".to_string(),
            ));
        }
        self.reconciler_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_socket_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), PipelineError>>,
    ) -> Result<(), PipelineError> {
        if self.socket_server_handle.is_some() {
            return Err(PipelineError::ShutdownError("server_handle already set".to_string()));
        }
        self.socket_server_handle = Some(handle);
        Ok(())
    }

    /// Signal every task and wait for them, bounded by the lifecycle's shutdown delay
    pub async fn shutdown(&mut self) -> Result<(), PipelineError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), PipelineError> {
        info!("Shutting down deploywatch...");

        // 1. Reconciler worker, so no pass is cut off mid-write
        if let Some(handle) = self.reconciler_worker_handle.take() {
            handle.await.map_err(|e| PipelineError::ShutdownError(e.to_string()))?;
        }

        // 2. Socket server (open streams end with their sessions)
        if let Some(handle) = self.socket_server_handle.take() {
            handle.await.map_err(|e| PipelineError::ShutdownError(e.to_string()))??;
        }

        // 3. App state
        if let Some(state) = self.app_state.take() {
            info!("Releasing application state ({} references)", Arc::strong_count(&state));
        }

        info!("Shutdown complete");
        Ok(())
    }
}
