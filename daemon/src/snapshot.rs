use std::collections::BTreeSet;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

/// One live process: its pid and normalised executable base name.
pub type ProcessEntry = (u32, String);

/// Every process observed in a single poll tick. Ordered so that iteration
/// (and therefore which of several simultaneous matches wins) is deterministic.
pub type ProcessSnapshot = BTreeSet<ProcessEntry>;

const EXE_SUFFIX: &str = ".exe";

/// Lower-cases a reported process name and appends `.exe` if missing, so it
/// compares equal to the names produced by the library scan.
pub fn executable_base_name(process_name: &str) -> String {
    let lower = process_name.to_lowercase();
    if lower.ends_with(EXE_SUFFIX) {
        lower
    } else {
        lower + EXE_SUFFIX
    }
}

/// Produces the current process list on demand.
pub trait SnapshotSource {
    fn snapshot(&mut self) -> ProcessSnapshot;
}

/// [`SnapshotSource`] backed by `sysinfo`. The `System` is reused across ticks.
pub struct SystemSnapshotSource {
    sys: System,
}

impl SystemSnapshotSource {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for SystemSnapshotSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSource for SystemSnapshotSource {
    fn snapshot(&mut self) -> ProcessSnapshot {
        // Names and pids only; skipping cpu/memory/disk keeps the tick cheap.
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new(),
        );

        self.sys
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let name = process.name().to_string_lossy();
                if name.is_empty() {
                    return None;
                }
                Some((pid.as_u32(), executable_base_name(&name)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_appends_suffix() {
        assert_eq!(executable_base_name("Game"), "game.exe");
    }

    #[test]
    fn base_name_keeps_existing_suffix() {
        assert_eq!(executable_base_name("Game.EXE"), "game.exe");
        assert_eq!(executable_base_name("game.exe"), "game.exe");
    }

    #[test]
    fn system_snapshot_contains_current_process() {
        let mut source = SystemSnapshotSource::new();
        let snapshot = source.snapshot();
        let me = std::process::id();
        assert!(snapshot.iter().any(|(pid, _)| *pid == me));
    }

    #[test]
    fn system_snapshot_names_are_normalised() {
        let mut source = SystemSnapshotSource::new();
        for (_, name) in source.snapshot() {
            assert!(name.ends_with(EXE_SUFFIX));
            assert_eq!(name, name.to_lowercase());
        }
    }
}
