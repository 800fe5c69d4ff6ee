use std::collections::BTreeSet;

use crate::library::InstalledGame;

/// Helper binaries shipped next to game executables that must never be
/// announced as the game itself. Matched case-insensitively against the end
/// of the executable name, so `UnityCrashHandler64.exe` also drops
/// `MyGame_UnityCrashHandler64.exe`.
pub const EXCLUDED_EXECUTABLES: &[&str] = &[
    "unitycrashhandler64.exe",
    "unitycrashhandler32.exe",
    "crashreportclient.exe",
    "crashpad_handler.exe",
    "crashhandler.exe",
    "crash_handler.exe",
    "crashreporter.exe",
    "unins000.exe",
    "unins001.exe",
    "vcredist_x64.exe",
    "vcredist_x86.exe",
    "dxsetup.exe",
    "easyanticheat_setup.exe",
];

/// Lower-cased executable base names belonging to installed games.
pub type KnownExecutableSet = BTreeSet<String>;

/// Returns `true` if `exe_name` is a helper binary: equal to, or ending with,
/// an entry of the built-in list or of `extra`. Blank `extra` entries match
/// nothing.
pub fn is_excluded(exe_name: &str, extra: &[String]) -> bool {
    let lower = exe_name.to_lowercase();
    EXCLUDED_EXECUTABLES.iter().any(|deny| lower.ends_with(deny))
        || extra
            .iter()
            .map(|deny| deny.trim())
            .filter(|deny| !deny.is_empty())
            .any(|deny| lower.ends_with(&deny.to_lowercase()))
}

/// Removes helper binaries from `names`.
pub fn filter_executables<I>(names: I, extra: &[String]) -> KnownExecutableSet
where
    I: IntoIterator<Item = String>,
{
    names
        .into_iter()
        .map(|n| n.to_lowercase())
        .filter(|n| !is_excluded(n, extra))
        .collect()
}

/// Flattens the executables of every scanned game into one filtered set.
pub fn known_executables(games: &[InstalledGame], extra: &[String]) -> KnownExecutableSet {
    filter_executables(
        games.iter().flat_map(|g| g.executables.iter().cloned()),
        extra,
    )
}
