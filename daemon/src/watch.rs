/// Directory watching shared by the config and library watchers.
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::warn;

/// Starts a non-recursive watch on `dir` and bridges its events into a tokio
/// channel. The watcher must be kept alive for as long as events are wanted.
/// Failures are logged under `label` and yield `None`.
pub fn watch_dir(
    dir: &Path,
    label: &str,
) -> Option<(RecommendedWatcher, mpsc::Receiver<notify::Event>)> {
    let (watch_tx, watch_rx) = mpsc::channel::<notify::Event>(16);
    let error_label = label.to_string();

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let _ = watch_tx.blocking_send(event);
            }
            Err(e) => warn!("{error_label} watcher error: {e}"),
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            warn!("Failed to create {label} watcher: {e}");
            return None;
        }
    };

    if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
        warn!(dir = %dir.display(), "Failed to watch {label} directory: {e}");
        return None;
    }

    Some((watcher, watch_rx))
}
