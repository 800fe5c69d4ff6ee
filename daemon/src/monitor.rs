use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{Config, RelayConfig};
use crate::event::DaemonEvent;
use crate::filter::{known_executables, KnownExecutableSet};
use crate::library::scan_library;
use crate::notifier::{Notifier, Relay};
use crate::presence::{PresenceState, TransitionEvent};
use crate::snapshot::SnapshotSource;

/// Builds the relay for a relay config; `None` disables publishing.
pub type RelayFactory<R> = Box<dyn Fn(&RelayConfig) -> Option<R> + Send>;

/// The polling loop. Owns the presence state and everything that feeds it,
/// so all of it is only ever touched from the task running [`Monitor::run`].
pub struct Monitor<S: SnapshotSource, R: Relay> {
    source: S,
    state: PresenceState,
    known: KnownExecutableSet,
    notifier: Notifier<R>,
    make_relay: RelayFactory<R>,
    library_root: PathBuf,
    library_watch: bool,
    excluded: Vec<String>,
    relay_config: RelayConfig,
    rescan_pending: bool,
}

impl<S: SnapshotSource, R: Relay> Monitor<S, R> {
    /// Scans the library at `library_root` and starts out idle.
    pub fn new(
        source: S,
        library_root: PathBuf,
        config: &Config,
        make_relay: RelayFactory<R>,
    ) -> Self {
        let notifier = Notifier::new(
            make_relay(&config.relay),
            config.relay.status_identifier.clone(),
        );
        let mut monitor = Self {
            source,
            state: PresenceState::new(),
            known: KnownExecutableSet::new(),
            notifier,
            make_relay,
            library_root,
            library_watch: config.library.watch,
            excluded: config.monitor.excluded_executables.clone(),
            relay_config: config.relay.clone(),
            rescan_pending: false,
        };
        monitor.rescan();
        monitor
    }

    #[cfg(test)]
    pub fn known(&self) -> &KnownExecutableSet {
        &self.known
    }

    #[cfg(test)]
    pub fn state(&self) -> &PresenceState {
        &self.state
    }

    /// Rebuilds the known executable set from the library.
    pub fn rescan(&mut self) {
        let games = scan_library(&self.library_root);
        self.known = known_executables(&games, &self.excluded);
        self.rescan_pending = false;
        info!(executables = self.known.len(), "known executables updated");
        debug!(known = ?self.known, "known executables");
    }

    /// Runs one tick: snapshot, transition, dispatch. Returns the transitions.
    pub fn poll(&mut self) -> Vec<TransitionEvent> {
        if self.rescan_pending {
            self.rescan();
        }

        let snapshot = self.source.snapshot();
        let state = std::mem::take(&mut self.state);
        let (state, events) = state.tick(snapshot, &self.known);
        self.state = state;

        for event in &events {
            self.notifier.dispatch(event);
        }
        events
    }

    /// Applies a daemon event. Returns `false` once the loop should stop.
    pub fn handle(&mut self, event: DaemonEvent) -> bool {
        match event {
            DaemonEvent::LibraryChanged => {
                // Coalesced: a burst of manifest writes costs one rescan.
                self.rescan_pending = true;
            }
            DaemonEvent::ConfigReloaded(config) => self.apply_config(config),
            DaemonEvent::Shutdown => {
                if let Some(playing) = self.state.playing() {
                    info!(executable = %playing.executable, "Shutting down while playing");
                }
                return false;
            }
        }
        true
    }

    fn apply_config(&mut self, config: Config) {
        if config.monitor.excluded_executables != self.excluded {
            self.excluded = config.monitor.excluded_executables.clone();
            self.rescan_pending = true;
        }
        if config.relay != self.relay_config {
            self.notifier.reconfigure(
                (self.make_relay)(&config.relay),
                config.relay.status_identifier.clone(),
            );
            self.relay_config = config.relay.clone();
            info!(relay = ?self.relay_config, "relay reconfigured");
        }
        for setting in self.restart_required(&config) {
            warn!("{setting} changed; restart the daemon to apply it");
        }
    }

    /// Settings in `config` that differ from the running ones but only take
    /// effect on startup.
    fn restart_required(&self, config: &Config) -> Vec<&'static str> {
        let mut settings = Vec::new();
        if config
            .library
            .root
            .as_ref()
            .is_some_and(|root| *root != self.library_root)
        {
            settings.push("library.root");
        }
        if config.library.watch != self.library_watch {
            settings.push("library.watch");
        }
        settings
    }

    /// Polls every `poll_interval` until a shutdown event arrives or every
    /// event sender is gone.
    pub async fn run(mut self, mut poll_interval: Duration, mut rx: mpsc::Receiver<DaemonEvent>) {
        let mut ticker = new_ticker(poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll();
                }
                evt = rx.recv() => {
                    let Some(evt) = evt else { break };
                    let next_interval = match &evt {
                        DaemonEvent::ConfigReloaded(config) => Some(config.monitor.poll_interval()),
                        _ => None,
                    };
                    if !self.handle(evt) {
                        break;
                    }
                    if let Some(next) = next_interval.filter(|d| *d != poll_interval) {
                        info!(interval_ms = next.as_millis() as u64, "poll interval changed");
                        poll_interval = next;
                        ticker = new_ticker(poll_interval);
                    }
                }
            }
        }
    }
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    // A slow tick delays the next one instead of bursting to catch up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::PresenceMessage;
    use crate::snapshot::ProcessSnapshot;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// Replays a fixed list of snapshots, then keeps returning the last one.
    struct ScriptedSource {
        script: VecDeque<ProcessSnapshot>,
        last: ProcessSnapshot,
    }

    impl ScriptedSource {
        fn new(script: Vec<ProcessSnapshot>) -> Self {
            Self {
                script: script.into(),
                last: ProcessSnapshot::new(),
            }
        }
    }

    impl SnapshotSource for ScriptedSource {
        fn snapshot(&mut self) -> ProcessSnapshot {
            if let Some(next) = self.script.pop_front() {
                self.last = next;
            }
            self.last.clone()
        }
    }

    type Published = Arc<Mutex<Vec<Vec<PresenceMessage>>>>;

    #[derive(Clone)]
    struct RecordingRelay {
        published: Published,
    }

    impl Relay for RecordingRelay {
        async fn publish(&self, messages: Vec<PresenceMessage>) -> anyhow::Result<()> {
            self.published.lock().unwrap().push(messages);
            Ok(())
        }
    }

    fn recording_relay(published: &Published) -> RelayFactory<RecordingRelay> {
        let published = Arc::clone(published);
        Box::new(move |cfg: &RelayConfig| {
            cfg.enabled.then(|| RecordingRelay {
                published: Arc::clone(&published),
            })
        })
    }

    fn no_relay() -> RelayFactory<RecordingRelay> {
        Box::new(|_: &RelayConfig| None)
    }

    fn snap(entries: &[(u32, &str)]) -> ProcessSnapshot {
        entries.iter().map(|(p, n)| (*p, n.to_string())).collect()
    }

    fn write_game(root: &Path, id: u32, name: &str, exes: &[&str]) {
        std::fs::write(
            root.join(format!("appmanifest_{id}.acf")),
            format!("\"AppState\" {{ \"name\" \"{name}\" \"installdir\" \"{name}\" }}"),
        )
        .unwrap();
        let dir = root.join("common").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for exe in exes {
            std::fs::write(dir.join(exe), b"").unwrap();
        }
    }

    fn started(name: &str) -> TransitionEvent {
        TransitionEvent::Started(name.to_string())
    }

    fn stopped(name: &str) -> TransitionEvent {
        TransitionEvent::Stopped(name.to_string())
    }

    #[test]
    fn new_scans_library_and_filters_helpers() {
        let root = tempfile::tempdir().unwrap();
        write_game(root.path(), 1, "Editor", &["Editor.exe", "UnityCrashHandler64.exe"]);

        let monitor = Monitor::new(
            ScriptedSource::new(vec![]),
            root.path().to_path_buf(),
            &Config::default(),
            no_relay(),
        );
        assert_eq!(
            monitor.known().iter().collect::<Vec<_>>(),
            vec!["editor.exe"]
        );
        assert!(monitor.state().is_idle());
    }

    #[test]
    fn polls_through_a_session() {
        let root = tempfile::tempdir().unwrap();
        write_game(root.path(), 1, "Editor", &["editor.exe"]);

        let source = ScriptedSource::new(vec![
            snap(&[(1, "editor.exe"), (9, "shell.exe")]),
            snap(&[(1, "editor.exe"), (9, "shell.exe")]),
            snap(&[(9, "shell.exe")]),
        ]);
        let mut monitor = Monitor::new(
            source,
            root.path().to_path_buf(),
            &Config::default(),
            no_relay(),
        );

        assert_eq!(monitor.poll(), vec![started("editor.exe")]);
        assert!(monitor.poll().is_empty());
        assert_eq!(monitor.poll(), vec![stopped("editor.exe")]);
        assert!(monitor.state().is_idle());
    }

    #[test]
    fn library_change_rescans_on_next_poll() {
        let root = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new(vec![snap(&[(5, "newgame.exe")])]);
        let mut monitor = Monitor::new(
            source,
            root.path().to_path_buf(),
            &Config::default(),
            no_relay(),
        );
        assert!(monitor.known().is_empty());

        write_game(root.path(), 2, "NewGame", &["NewGame.exe"]);
        assert!(monitor.handle(DaemonEvent::LibraryChanged));
        assert_eq!(monitor.poll(), vec![started("newgame.exe")]);
    }

    #[test]
    fn config_reload_extends_exclusions() {
        let root = tempfile::tempdir().unwrap();
        write_game(root.path(), 1, "Game", &["game.exe", "launcher.exe"]);
        let mut monitor = Monitor::new(
            ScriptedSource::new(vec![]),
            root.path().to_path_buf(),
            &Config::default(),
            no_relay(),
        );
        assert!(monitor.known().contains("launcher.exe"));

        let mut config = Config::default();
        config.monitor.excluded_executables = vec!["Launcher.exe".to_string()];
        assert!(monitor.handle(DaemonEvent::ConfigReloaded(config)));
        monitor.poll();
        assert!(!monitor.known().contains("launcher.exe"));
        assert!(monitor.known().contains("game.exe"));
    }

    #[test]
    fn library_settings_need_a_restart() {
        let root = tempfile::tempdir().unwrap();
        let mut monitor = Monitor::new(
            ScriptedSource::new(vec![]),
            root.path().to_path_buf(),
            &Config::default(),
            no_relay(),
        );
        assert!(monitor.restart_required(&Config::default()).is_empty());

        let mut config = Config::default();
        config.library.watch = false;
        assert_eq!(monitor.restart_required(&config), vec!["library.watch"]);

        config.library.root = Some(root.path().join("elsewhere"));
        assert_eq!(
            monitor.restart_required(&config),
            vec!["library.root", "library.watch"]
        );

        // Reloading keeps the running settings until restart.
        assert!(monitor.handle(DaemonEvent::ConfigReloaded(config.clone())));
        assert_eq!(
            monitor.restart_required(&config),
            vec!["library.root", "library.watch"]
        );
    }

    #[test]
    fn shutdown_stops_the_loop() {
        let root = tempfile::tempdir().unwrap();
        let mut monitor = Monitor::new(
            ScriptedSource::new(vec![]),
            root.path().to_path_buf(),
            &Config::default(),
            no_relay(),
        );
        assert!(!monitor.handle(DaemonEvent::Shutdown));
    }

    #[tokio::test]
    async fn poll_publishes_transitions() {
        let root = tempfile::tempdir().unwrap();
        write_game(root.path(), 1, "Game", &["game.exe"]);
        let source = ScriptedSource::new(vec![snap(&[(1, "game.exe")]), snap(&[])]);
        let published = Published::default();
        let mut monitor = Monitor::new(
            source,
            root.path().to_path_buf(),
            &Config::default(),
            recording_relay(&published),
        );

        monitor.poll();
        monitor.poll();

        // Deliveries run on their own tasks; give them a chance to finish.
        for _ in 0..100 {
            if published.lock().unwrap().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let published = published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert!(published.iter().any(|msgs| msgs.len() == 2));
        assert!(published.iter().any(|msgs| matches!(
            msgs.as_slice(),
            [PresenceMessage::Status { content, .. }] if content.is_empty()
        )));
    }

    #[tokio::test]
    async fn run_exits_on_shutdown() {
        let root = tempfile::tempdir().unwrap();
        let monitor = Monitor::new(
            ScriptedSource::new(vec![]),
            root.path().to_path_buf(),
            &Config::default(),
            no_relay(),
        );
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(monitor.run(Duration::from_millis(10), rx));
        tx.send(DaemonEvent::Shutdown).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn run_exits_when_senders_are_dropped() {
        let root = tempfile::tempdir().unwrap();
        let monitor = Monitor::new(
            ScriptedSource::new(vec![]),
            root.path().to_path_buf(),
            &Config::default(),
            no_relay(),
        );
        let (tx, rx) = mpsc::channel::<DaemonEvent>(4);
        let handle = tokio::spawn(monitor.run(Duration::from_millis(10), rx));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
