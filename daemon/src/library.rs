/// Steam library scanning: app manifests (`*.acf`) in the library root and the
/// executables found directly in each game's install directory.
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::event::DaemonEvent;
use crate::keyvalues;
use crate::watch;

pub const MANIFEST_EXTENSION: &str = "acf";
pub const EXECUTABLE_EXTENSION: &str = "exe";
/// Games are installed under `<library root>/common/<installdir>`.
const COMMON_DIR: &str = "common";

/// One installed game, as described by its app manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledGame {
    pub name: String,
    pub install_dir: PathBuf,
    /// Lower-cased base names of the executables in `install_dir`.
    pub executables: BTreeSet<String>,
}

/// Fields read from an app manifest.
#[derive(Debug, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub install_dir: String,
}

/// Parses an app manifest, requiring non-empty `name` and `installdir` fields.
pub fn parse_manifest(content: &str) -> Result<Manifest> {
    let doc = keyvalues::parse(content)?;
    let state = doc
        .first_table()
        .ok_or_else(|| anyhow!("manifest has no AppState block"))?;
    let field = |key: &str| {
        state
            .get_str(key)
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("manifest is missing \"{key}\""))
    };
    Ok(Manifest {
        name: field("name")?,
        install_dir: field("installdir")?,
    })
}

/// Lists the executables directly under `dir`. A missing or unreadable
/// directory yields an empty set.
pub fn list_executables(dir: &Path) -> BTreeSet<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), "install directory unreadable: {e}");
            return BTreeSet::new();
        }
    };

    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, EXECUTABLE_EXTENSION))
        .filter_map(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
        })
        .collect()
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
}

fn load_game(root: &Path, manifest_path: &Path) -> Result<InstalledGame> {
    let content = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("Failed to read manifest: {}", manifest_path.display()))?;
    let manifest = parse_manifest(&content)
        .with_context(|| format!("Failed to parse manifest: {}", manifest_path.display()))?;
    let install_dir = root.join(COMMON_DIR).join(&manifest.install_dir);
    let executables = list_executables(&install_dir);
    Ok(InstalledGame {
        name: manifest.name,
        install_dir,
        executables,
    })
}

/// Scans every manifest in `root`. Manifests that cannot be read or parsed
/// are logged and skipped; an unreadable root yields no games.
pub fn scan_library(root: &Path) -> Vec<InstalledGame> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %root.display(), "Failed to read library directory: {e}");
            return Vec::new();
        }
    };

    let mut manifests: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, MANIFEST_EXTENSION))
        .collect();
    manifests.sort();

    let mut games = Vec::with_capacity(manifests.len());
    for path in manifests {
        match load_game(root, &path) {
            Ok(game) => {
                debug!(
                    game = %game.name,
                    install_dir = %game.install_dir.display(),
                    executables = game.executables.len(),
                    "found installed game"
                );
                games.push(game);
            }
            Err(e) => warn!("Skipping manifest: {e:#}"),
        }
    }

    info!(root = %root.display(), games = games.len(), "library scanned");
    games
}

fn is_manifest_event(event: &notify::Event) -> bool {
    let relevant_kind = matches!(
        event.kind,
        notify::EventKind::Create(_) | notify::EventKind::Modify(_) | notify::EventKind::Remove(_)
    );
    relevant_kind
        && event
            .paths
            .iter()
            .any(|p| has_extension(p, MANIFEST_EXTENSION))
}

/// Watches `root` for manifests being created, changed, renamed or removed
/// and sends [`DaemonEvent::LibraryChanged`] for each such change.
pub async fn watch_library(root: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let Some((_watcher, mut watch_rx)) = watch::watch_dir(&root, "library") else {
        return;
    };

    while let Some(event) = watch_rx.recv().await {
        if !is_manifest_event(&event) {
            continue;
        }
        debug!(paths = ?event.paths, kind = ?event.kind, "manifest changed");
        if tx.send(DaemonEvent::LibraryChanged).await.is_err() {
            break;
        }
    }
}
