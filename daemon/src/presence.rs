/// The "now playing" state machine.
///
/// Each poll tick the new process snapshot is diffed against the previous one.
/// Newly started processes whose executable is a known game fill the single
/// presence slot if it is empty; the process held in the slot disappearing
/// empties it. Every fill and every clear yields exactly one
/// [`TransitionEvent`].
///
/// Only one game is announced at a time. A second matching process started
/// while the slot is occupied is ignored, even after the first one exits,
/// because it never shows up in a later `started` set.
use crate::filter::KnownExecutableSet;
use crate::snapshot::{ProcessEntry, ProcessSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionEvent {
    /// A known game executable started and now occupies the slot.
    Started(String),
    /// The process in the slot exited.
    Stopped(String),
}

/// The process currently announced as playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayingProcess {
    pub pid: u32,
    pub executable: String,
}

/// Processes that appeared and disappeared between two snapshots.
#[derive(Debug, Default, PartialEq)]
pub struct SnapshotDiff {
    pub started: Vec<ProcessEntry>,
    pub stopped: Vec<ProcessEntry>,
}

impl SnapshotDiff {
    pub fn between(previous: &ProcessSnapshot, next: &ProcessSnapshot) -> Self {
        Self {
            started: next.difference(previous).cloned().collect(),
            stopped: previous.difference(next).cloned().collect(),
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty()
    }
}

/// Everything the monitor carries from one tick to the next.
#[derive(Debug, Default, Clone)]
pub struct PresenceState {
    previous: ProcessSnapshot,
    slot: Option<PlayingProcess>,
}

impl PresenceState {
    /// Idle, with an empty previous snapshot so that every process in the first
    /// snapshot counts as started.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playing(&self) -> Option<&PlayingProcess> {
        self.slot.as_ref()
    }

    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        self.slot.is_none()
    }

    /// Applies one snapshot and returns the follow-up state together with the
    /// transitions it caused, in the order they happened.
    pub fn tick(
        self,
        next: ProcessSnapshot,
        known: &KnownExecutableSet,
    ) -> (PresenceState, Vec<TransitionEvent>) {
        let diff = SnapshotDiff::between(&self.previous, &next);
        let mut slot = self.slot;
        let mut events = Vec::new();

        for (pid, executable) in diff.started {
            if slot.is_some() || !known.contains(&executable) {
                continue;
            }
            events.push(TransitionEvent::Started(executable.clone()));
            slot = Some(PlayingProcess { pid, executable });
        }

        for (pid, _) in diff.stopped {
            if let Some(playing) = slot.take_if(|p| p.pid == pid) {
                events.push(TransitionEvent::Stopped(playing.executable));
            }
        }

        let state = PresenceState {
            previous: next,
            slot,
        };
        (state, events)
    }
}
