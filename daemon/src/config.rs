use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::event::DaemonEvent;
use crate::notifier::DEFAULT_STATUS_IDENTIFIER;
use crate::relay::DEFAULT_RELAY_URL;
use crate::watch;

pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Root configuration structure. Deserialized from `<config dir>/NowPlaying/config.toml`.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Where installed games are looked up.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LibraryConfig {
    /// Overrides the discovered `steamapps` directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Rescan when app manifests are added, changed or removed.
    #[serde(default = "default_true")]
    pub watch: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: None,
            watch: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Delay between process list polls in milliseconds. Clamped to [100, 60000].
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Additional helper executables to ignore, on top of the built-in list.
    #[serde(default)]
    pub excluded_executables: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            excluded_executables: Vec::new(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
        )
    }
}

/// Nostr relay the presence is published to.
#[derive(Clone, Deserialize, PartialEq)]
pub struct RelayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_relay_url")]
    pub url: String,
    /// nsec or hex secret key. An ephemeral key is used when absent.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// `d` tag of the published status record.
    #[serde(default = "default_status_identifier")]
    pub status_identifier: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: DEFAULT_RELAY_URL.to_string(),
            secret_key: None,
            status_identifier: DEFAULT_STATUS_IDENTIFIER.to_string(),
        }
    }
}

// Keeps the secret key out of logs.
impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("status_identifier", &self.status_identifier)
            .finish()
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the config
/// file is created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    // Watch the parent directory rather than the file directly so we catch
    // editor-style atomic saves (write-new + rename).
    let Some(dir) = path.parent() else {
        warn!(path = %path.display(), "Config path has no parent directory");
        return;
    };
    let Some((_watcher, mut watch_rx)) = watch::watch_dir(dir, "config") else {
        return;
    };

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to reload config: {e:#}"),
            }
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_relay_url() -> String {
    DEFAULT_RELAY_URL.to_string()
}

fn default_status_identifier() -> String {
    DEFAULT_STATUS_IDENTIFIER.to_string()
}
