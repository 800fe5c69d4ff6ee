use crate::config::Config;

pub enum DaemonEvent {
    /// An app manifest in the library root was added, changed or removed.
    LibraryChanged,
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; the daemon should stop polling and exit.
    Shutdown,
}
