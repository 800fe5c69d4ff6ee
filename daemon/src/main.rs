mod config;
mod event;
mod filter;
mod keyvalues;
mod library;
mod logging;
mod monitor;
mod notifier;
mod paths;
mod presence;
mod relay;
mod snapshot;
mod watch;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::monitor::Monitor;
use crate::relay::NostrRelay;
use crate::snapshot::SystemSnapshotSource;

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init() {
        eprintln!("Failed to initialise logging: {e}");
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path();
    let initial_config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        error!("{e:#} (using defaults)");
        config::Config::default()
    });
    info!(path = %config_path.display(), config = ?initial_config, "config loaded");

    // ── Library ───────────────────────────────────────────────────────────────
    let library_root = paths::resolve_library_root(initial_config.library.root.as_deref());
    info!(root = %library_root.display(), "library root");

    let (event_tx, event_rx) = mpsc::channel::<event::DaemonEvent>(32);

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));
    if initial_config.library.watch {
        tokio::spawn(library::watch_library(library_root.clone(), event_tx.clone()));
    }

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(event::DaemonEvent::Shutdown).await;
            }
        });
    }
    drop(event_tx);

    info!("nowplaying-daemon v{} started", env!("CARGO_PKG_VERSION"));

    // ── Polling loop ──────────────────────────────────────────────────────────
    let poll_interval = initial_config.monitor.poll_interval();
    let monitor = Monitor::<_, NostrRelay>::new(
        SystemSnapshotSource::new(),
        library_root,
        &initial_config,
        Box::new(NostrRelay::from_config),
    );
    monitor.run(poll_interval, event_rx).await;

    info!("Shutting down");
}
