//! deploywatch - Entry Point
//!
//! Serves live deployment progress and container logs over SSE and keeps
//! the resource registry reconciled with the container runtime. With
//! `--watch=<resourceId>` it instead follows one deployment as a client.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use deploywatch::app::options::AppOptions;
use deploywatch::app::run::run;
use deploywatch::client::{DeployStatus, HttpProgressSource, ProgressTracker, TrackerOptions};
use deploywatch::errors::PipelineError;
use deploywatch::filesys::file::File;
use deploywatch::logs::{init_logging, LogOptions};
use deploywatch::storage::layout::StorageLayout;
use deploywatch::storage::settings::Settings;
use deploywatch::utils::version_info;

use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    // Retrieve the settings file
    let layout = StorageLayout::default();
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let (settings, settings_found) = match load_settings(&settings_file).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Unable to read settings file {:?}: {}", settings_file.path(), e);
            return;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings.log_dir.clone(),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };
    if !settings_found {
        warn!("No settings file at {:?}, using defaults", settings_file.path());
    }

    // Follow one deployment as a client
    if let Some(resource_id) = cli_args.get("watch") {
        let server = cli_args
            .get("server")
            .cloned()
            .unwrap_or_else(|| format!("http://{}:{}/", settings.server.host, settings.server.port));
        let timeout = std::time::Duration::from_secs(settings.tailer.session_budget_secs);
        if let Err(e) = watch(resource_id, &server, timeout).await {
            error!("Failed to watch {}: {}", resource_id, e);
        }
        return;
    }

    // Run the server
    let options = AppOptions::from_settings(&settings, &layout);
    info!("Running deploywatch {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run deploywatch: {e}");
    }
}

/// Load settings, falling back to defaults when the file does not exist
async fn load_settings(file: &File) -> Result<(Settings, bool), PipelineError> {
    match file.read_string_opt().await? {
        Some(contents) => Ok((serde_json::from_str(&contents)?, true)),
        None => Ok((Settings::default(), false)),
    }
}

/// Print a deployment's events as they arrive until its stream ends
async fn watch(
    resource_id: &str,
    server: &str,
    timeout: std::time::Duration,
) -> Result<(), PipelineError> {
    let source = Arc::new(HttpProgressSource::new(server)?);
    let tracker = ProgressTracker::new(
        source,
        TrackerOptions {
            session_timeout: timeout,
        },
    );
    let mut updates = tracker.watch();

    tracker.subscribe(resource_id, "");
    let idle = tracker.wait_idle(resource_id);
    tokio::pin!(idle);

    let mut printed = 0;
    loop {
        let finished = tokio::select! {
            _ = &mut idle => true,
            changed = updates.changed() => changed.is_err(),
        };
        if let Some(deploy) = tracker.get(resource_id) {
            for event in deploy.events.iter().skip(printed) {
                match &event.error {
                    Some(message) => println!("{} {}", event.event_type.as_str(), message),
                    None => println!("{}", event.event_type.as_str()),
                }
            }
            printed = deploy.events.len();
        }
        if finished {
            break;
        }
    }

    match tracker.get(resource_id).map(|deploy| deploy.status) {
        Some(DeployStatus::Complete) => println!("status: complete"),
        Some(DeployStatus::Error) => println!("status: error"),
        Some(DeployStatus::InProgress) => println!("status: in_progress (stream ended)"),
        None => println!("status: unknown"),
    }
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received, shutting down...");
                    }
                    _ = sigint.recv() => {
                        info!("SIGINT received, shutting down...");
                    }
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Unable to install signal handlers ({}), falling back to Ctrl+C", e);
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, shutting down..."),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
