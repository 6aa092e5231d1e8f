//! Well-known locations and file names.

use dirs::home_dir;
use std::path::PathBuf;

/// Returns the lean configuration directory, or None if the user's home cannot be resolved.
///
/// `LEAN_HOME` overrides the default `~/.lean`.
pub fn try_lean_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("LEAN_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".lean"))
}

/// Configuration file: ~/.lean/config.toml
pub fn config_path() -> Option<PathBuf> {
    try_lean_home().map(|home| home.join("config.toml"))
}

/// Default artifact cache: `C:\lean` on Windows, `~/lean` elsewhere.
pub fn default_cache_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        Some(PathBuf::from(r"C:\lean"))
    } else {
        home_dir().map(|h| h.join("lean"))
    }
}

/// Default profile script that receives PATH exports on Unix hosts.
pub fn default_profile_script() -> PathBuf {
    PathBuf::from("/etc/profile.d/lean_paths.sh")
}

/// Name of the append-only provenance log inside the cache.
pub const PROVENANCE_LOG: &str = "download.log";

/// Remote directory holding dependency descriptors, relative to the OS directory.
pub const DEP_TREE_DIR: &str = "dep_tree";

/// Build include file mirrored from the remote OS directory into the cache.
pub const IMPORT_CMAKE: &str = "import.cmake";

/// Prefix of staging directories created during extraction.
pub const STAGING_PREFIX: &str = "temp_";
