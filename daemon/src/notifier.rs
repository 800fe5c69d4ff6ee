/// Turns presence transitions into outbound messages and hands them to a
/// [`Relay`] on a background task.
///
/// Delivery is best-effort: the polling loop never waits for it, and failures
/// are logged here and go no further.
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::presence::TransitionEvent;

pub const DEFAULT_STATUS_IDENTIFIER: &str = "general";
const EXE_SUFFIX: &str = ".exe";

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceMessage {
    /// Free-text note for followers.
    Note { content: String },
    /// Replaceable status record addressed by `identifier`. Empty `content`
    /// means "no longer playing".
    Status {
        identifier: String,
        content: String,
        /// Increases with every dispatched transition; consumers use it to
        /// order records that were delivered out of order.
        seq: u64,
    },
}

/// Outbound transport for presence messages.
pub trait Relay: Send + Sync + 'static {
    /// Publishes `messages` in order.
    fn publish(&self, messages: Vec<PresenceMessage>) -> impl Future<Output = Result<()>> + Send;
}

/// Display label for an executable: its base name without `.exe`.
pub fn game_label(executable: &str) -> &str {
    let stem_len = executable.len().saturating_sub(EXE_SUFFIX.len());
    match executable.get(stem_len..) {
        Some(suffix) if stem_len > 0 && suffix.eq_ignore_ascii_case(EXE_SUFFIX) => {
            &executable[..stem_len]
        }
        _ => executable,
    }
}

/// Builds the messages announcing `event`.
pub fn build_messages(event: &TransitionEvent, identifier: &str, seq: u64) -> Vec<PresenceMessage> {
    match event {
        TransitionEvent::Started(exe) => {
            let text = format!("Now Playing: {}", game_label(exe));
            vec![
                PresenceMessage::Note {
                    content: text.clone(),
                },
                PresenceMessage::Status {
                    identifier: identifier.to_string(),
                    content: text,
                    seq,
                },
            ]
        }
        TransitionEvent::Stopped(_) => vec![PresenceMessage::Status {
            identifier: identifier.to_string(),
            content: String::new(),
            seq,
        }],
    }
}

/// Owns the relay and the outbound sequence counter. Lives on the polling task.
pub struct Notifier<R: Relay> {
    relay: Option<Arc<R>>,
    identifier: String,
    seq: u64,
}

impl<R: Relay> Notifier<R> {
    /// `relay = None` disables delivery; transitions are only logged.
    pub fn new(relay: Option<R>, identifier: impl Into<String>) -> Self {
        Self {
            relay: relay.map(Arc::new),
            identifier: identifier.into(),
            seq: 0,
        }
    }

    /// Swaps the transport and identifier, e.g. after a config reload.
    /// The sequence counter keeps running.
    pub fn reconfigure(&mut self, relay: Option<R>, identifier: impl Into<String>) {
        self.relay = relay.map(Arc::new);
        self.identifier = identifier.into();
    }

    #[cfg(test)]
    pub fn last_seq(&self) -> u64 {
        self.seq
    }

    /// Spawns delivery of `event` and returns immediately. The handle is only
    /// useful to tests; the daemon drops it.
    pub fn dispatch(&mut self, event: &TransitionEvent) -> Option<JoinHandle<()>> {
        self.seq += 1;
        let seq = self.seq;
        match event {
            TransitionEvent::Started(exe) => info!(game = game_label(exe), seq, "Now playing"),
            TransitionEvent::Stopped(exe) => info!(game = game_label(exe), seq, "Stopped playing"),
        }

        let Some(relay) = self.relay.clone() else {
            debug!(seq, "relay disabled; not publishing");
            return None;
        };
        let messages = build_messages(event, &self.identifier, seq);
        Some(tokio::spawn(async move {
            match relay.publish(messages).await {
                Ok(()) => debug!(seq, "presence published"),
                Err(e) => warn!(seq, "Failed to publish presence: {e:#}"),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct RecordingRelay {
        published: Mutex<Vec<Vec<PresenceMessage>>>,
    }

    impl Relay for Arc<RecordingRelay> {
        async fn publish(&self, messages: Vec<PresenceMessage>) -> Result<()> {
            self.published.lock().unwrap().push(messages);
            Ok(())
        }
    }

    struct FailingRelay;

    impl Relay for FailingRelay {
        async fn publish(&self, _messages: Vec<PresenceMessage>) -> Result<()> {
            anyhow::bail!("relay unreachable")
        }
    }

    /// Blocks every publish until a permit is released.
    struct GatedRelay {
        gate: Arc<Semaphore>,
    }

    impl Relay for GatedRelay {
        async fn publish(&self, _messages: Vec<PresenceMessage>) -> Result<()> {
            let _permit = self.gate.acquire().await?;
            Ok(())
        }
    }

    fn started(name: &str) -> TransitionEvent {
        TransitionEvent::Started(name.to_string())
    }

    fn stopped(name: &str) -> TransitionEvent {
        TransitionEvent::Stopped(name.to_string())
    }

    // ── game_label ────────────────────────────────────────────────────────────

    #[test]
    fn label_strips_exe_suffix() {
        assert_eq!(game_label("portal2.exe"), "portal2");
        assert_eq!(game_label("Game.EXE"), "Game");
    }

    #[test]
    fn label_keeps_other_names() {
        assert_eq!(game_label("game"), "game");
        assert_eq!(game_label(".exe"), ".exe");
        assert_eq!(game_label("ゲーム"), "ゲーム");
    }

    // ── build_messages ────────────────────────────────────────────────────────

    #[test]
    fn started_builds_note_and_status() {
        let msgs = build_messages(&started("portal2.exe"), "general", 3);
        assert_eq!(
            msgs,
            vec![
                PresenceMessage::Note {
                    content: "Now Playing: portal2".to_string()
                },
                PresenceMessage::Status {
                    identifier: "general".to_string(),
                    content: "Now Playing: portal2".to_string(),
                    seq: 3,
                },
            ]
        );
    }

    #[test]
    fn stopped_builds_cleared_status() {
        let msgs = build_messages(&stopped("portal2.exe"), "general", 4);
        assert_eq!(
            msgs,
            vec![PresenceMessage::Status {
                identifier: "general".to_string(),
                content: String::new(),
                seq: 4,
            }]
        );
    }

    // ── Notifier ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn dispatch_publishes_with_increasing_seq() {
        let relay = Arc::new(RecordingRelay::default());
        let mut notifier = Notifier::new(Some(Arc::clone(&relay)), "general");

        notifier.dispatch(&started("game.exe")).unwrap().await.unwrap();
        notifier.dispatch(&stopped("game.exe")).unwrap().await.unwrap();

        let published = relay.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].len(), 2);
        assert!(matches!(published[0][1], PresenceMessage::Status { seq: 1, .. }));
        assert!(matches!(
            &published[1][0],
            PresenceMessage::Status { seq: 2, content, .. } if content.is_empty()
        ));
        assert_eq!(notifier.last_seq(), 2);
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let mut notifier = Notifier::new(Some(FailingRelay), "general");
        let handle = notifier.dispatch(&started("game.exe")).unwrap();
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn disabled_relay_still_counts() {
        let mut notifier: Notifier<FailingRelay> = Notifier::new(None, "general");
        assert!(notifier.dispatch(&started("game.exe")).is_none());
        assert_eq!(notifier.last_seq(), 1);
    }

    #[tokio::test]
    async fn dispatch_does_not_wait_for_delivery() {
        let gate = Arc::new(Semaphore::new(0));
        let mut notifier = Notifier::new(
            Some(GatedRelay {
                gate: Arc::clone(&gate),
            }),
            "general",
        );

        let first = notifier.dispatch(&started("game.exe")).unwrap();
        let second = notifier.dispatch(&stopped("game.exe")).unwrap();
        assert!(!first.is_finished());
        assert!(!second.is_finished());

        gate.add_permits(2);
        first.await.unwrap();
        second.await.unwrap();
    }
}
