/// Canonical file paths for the daemon and the Steam library it scans.
///
/// The config file lives at `<config dir>/NowPlaying/config.toml`
/// (`%APPDATA%\NowPlaying\config.toml` on Windows).
///
/// The library root is the `steamapps` directory holding the app manifests.
/// It is resolved from, in order: the config override, the Steam install path
/// in the Windows registry, [`default_library_root`].
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APP_DIR_NAME: &str = "NowPlaying";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STEAMAPPS_DIR_NAME: &str = "steamapps";

/// Returns the application config directory, e.g. %APPDATA%\NowPlaying\
pub fn app_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Returns the full path to the config file.
pub fn config_file_path() -> PathBuf {
    app_config_dir().join(CONFIG_FILE_NAME)
}

/// Library root used when neither the config nor the registry names one.
#[cfg(windows)]
pub fn default_library_root() -> PathBuf {
    PathBuf::from(r"C:\Program Files (x86)\Steam").join(STEAMAPPS_DIR_NAME)
}

/// Library root used when the config does not name one.
#[cfg(not(windows))]
pub fn default_library_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Steam")
        .join(STEAMAPPS_DIR_NAME)
}

/// Picks the library root to scan.
pub fn resolve_library_root(configured: Option<&Path>) -> PathBuf {
    if let Some(root) = configured {
        debug!(root = %root.display(), "using configured library root");
        return root.to_path_buf();
    }
    match steam_install_path() {
        Some(install) => {
            debug!(install = %install.display(), "Steam install path from registry");
            install.join(STEAMAPPS_DIR_NAME)
        }
        None => {
            let root = default_library_root();
            info!(root = %root.display(), "Steam install path not found; using default");
            root
        }
    }
}

// ── Windows registry lookup ───────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use std::path::PathBuf;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::ERROR_SUCCESS;
    use windows::Win32::System::Registry::{
        RegCloseKey, RegOpenKeyExW, RegQueryValueExW, HKEY, HKEY_LOCAL_MACHINE, KEY_QUERY_VALUE,
        REG_SZ, REG_VALUE_TYPE,
    };

    const STEAM_KEY: &str = r"SOFTWARE\WOW6432Node\Valve\Steam";
    const VALUE_NAME: &str = "InstallPath";
    /// Enough for any path Windows accepts without the `\\?\` prefix.
    const MAX_VALUE_CHARS: usize = 1024;

    /// Converts a Rust `&str` to a null-terminated UTF-16 `Vec<u16>`.
    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Reads `HKLM\SOFTWARE\WOW6432Node\Valve\Steam\InstallPath`.
    pub fn steam_install_path() -> Option<PathBuf> {
        let key_w = to_wide(STEAM_KEY);
        let val_w = to_wide(VALUE_NAME);

        let mut hkey = HKEY::default();
        let err = unsafe {
            RegOpenKeyExW(
                HKEY_LOCAL_MACHINE,
                PCWSTR::from_raw(key_w.as_ptr()),
                0,
                KEY_QUERY_VALUE,
                &mut hkey,
            )
        };
        if err != ERROR_SUCCESS {
            return None;
        }

        let mut buf = vec![0u16; MAX_VALUE_CHARS];
        let mut len = (buf.len() * 2) as u32;
        let mut kind = REG_VALUE_TYPE::default();
        let err = unsafe {
            RegQueryValueExW(
                hkey,
                PCWSTR::from_raw(val_w.as_ptr()),
                None,
                Some(&mut kind as *mut REG_VALUE_TYPE),
                Some(buf.as_mut_ptr() as *mut u8),
                Some(&mut len as *mut u32),
            )
        };
        unsafe {
            let _ = RegCloseKey(hkey);
        }

        if err != ERROR_SUCCESS || kind != REG_SZ {
            return None;
        }

        let chars = (len as usize / 2).min(buf.len());
        let value = String::from_utf16_lossy(&buf[..chars]);
        let value = value.trim_end_matches('\0');
        if value.is_empty() {
            None
        } else {
            Some(PathBuf::from(value))
        }
    }
}

/// The Steam install directory recorded in the registry, if any.
pub fn steam_install_path() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        imp::steam_install_path()
    }
    #[cfg(not(windows))]
    {
        None
    }
}
