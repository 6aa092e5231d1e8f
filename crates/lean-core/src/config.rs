//! User configuration loaded from `~/.lean/config.toml`.
//!
//! ```toml
//! [remote]
//! url = "sftp://builder@10.0.0.5:22/srv/lean"
//! key = "/home/me/.ssh/id_ed25519"
//!
//! [cache]
//! dir = "/home/me/lean"
//! ```
//!
//! Environment variables `LEAN_REMOTE_URL`, `LEAN_CACHE_DIR` and
//! `LEAN_TOOLCHAIN` take precedence over the file.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use toml_edit::{DocumentMut, value};

use crate::paths;

/// Keys accepted by `lean config get|set`.
pub const KNOWN_KEYS: &[&str] = &[
    "remote.url",
    "remote.key",
    "remote.known_hosts",
    "cache.dir",
    "host.os_name",
    "host.os_version",
    "toolchain.default",
    "path.profile_script",
];

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LeanConfig {
    /// Remote artifact repository.
    pub remote: RemoteConfig,
    /// Local artifact cache.
    pub cache: CacheConfig,
    /// Host OS overrides for remote directory matching.
    pub host: HostConfig,
    /// Toolchain defaults.
    pub toolchain: ToolchainConfig,
    /// PATH registration settings.
    pub path: PathConfig,
}

/// `[remote]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    /// `sftp://user@host[:port]/root`, `file:///root`, or a plain directory path.
    pub url: Option<String>,
    /// SSH identity file for sftp remotes.
    pub key: Option<PathBuf>,
    /// Known-hosts policy for sftp remotes: `strict`, `accept` or `add`.
    pub known_hosts: Option<String>,
}

/// `[cache]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding installed artifacts.
    pub dir: Option<PathBuf>,
}

/// `[host]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostConfig {
    /// Overrides the detected OS name (e.g. `ubuntu`).
    pub os_name: Option<String>,
    /// Overrides the detected OS version (e.g. `22.04`).
    pub os_version: Option<String>,
}

/// `[toolchain]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Toolchain used when neither the command line nor the manifest names one.
    pub default: Option<String>,
}

/// `[path]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathConfig {
    /// Profile script receiving PATH exports on Unix hosts.
    pub profile_script: Option<PathBuf>,
}

impl LeanConfig {
    /// Load the configuration from the default location and apply environment overrides.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be resolved or the file is not valid TOML.
    pub fn load() -> Result<Self> {
        let path = paths::config_path()
            .context("Could not determine home directory. Set LEAN_HOME to override.")?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load the configuration file at `path` without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Overlay values from the environment, looked up through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("LEAN_REMOTE_URL").filter(|s| !s.is_empty()) {
            self.remote.url = Some(url);
        }
        if let Some(dir) = lookup("LEAN_CACHE_DIR").filter(|s| !s.is_empty()) {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Some(tc) = lookup("LEAN_TOOLCHAIN").filter(|s| !s.is_empty()) {
            self.toolchain.default = Some(tc);
        }
    }

    /// Cache directory, falling back to the platform default.
    ///
    /// # Errors
    ///
    /// Returns an error when no cache directory is configured and the home directory is unknown.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache.dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::default_cache_dir()
                .context("Could not determine a cache directory. Set cache.dir in config.toml."),
        }
    }

    /// Profile script used for PATH registration on Unix hosts.
    pub fn profile_script(&self) -> PathBuf {
        self.path
            .profile_script
            .clone()
            .unwrap_or_else(paths::default_profile_script)
    }

    /// Look up a dotted key such as `remote.url`.
    ///
    /// # Errors
    ///
    /// Returns an error for keys outside [`KNOWN_KEYS`].
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let path = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());
        let found = match key {
            "remote.url" => self.remote.url.clone(),
            "remote.key" => path(&self.remote.key),
            "remote.known_hosts" => self.remote.known_hosts.clone(),
            "cache.dir" => path(&self.cache.dir),
            "host.os_name" => self.host.os_name.clone(),
            "host.os_version" => self.host.os_version.clone(),
            "toolchain.default" => self.toolchain.default.clone(),
            "path.profile_script" => path(&self.path.profile_script),
            _ => bail!("Unknown config key '{key}'. Known keys: {}", KNOWN_KEYS.join(", ")),
        };
        Ok(found)
    }
}

/// Set `key` to `val` in the config file at `path`, preserving comments and layout.
///
/// # Errors
///
/// Returns an error for unknown keys, or when the file cannot be read, parsed or written.
pub fn set_value(path: &Path, key: &str, val: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        bail!(
            "Unknown config key '{key}'. Known keys: {}",
            KNOWN_KEYS.join(", ")
        );
    }
    let (section, field) = key
        .split_once('.')
        .with_context(|| format!("Malformed key '{key}'"))?;

    let content = if path.exists() {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        String::new()
    };
    let mut doc = content
        .parse::<DocumentMut>()
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if doc.get(section).is_none() {
        doc[section] = toml_edit::table();
    }
    doc[section][field] = value(val);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, doc.to_string())
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = LeanConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, LeanConfig::default());
    }

    #[test]
    fn test_load_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[remote]\nurl = \"sftp://ci@build01/srv/lean\"\n\n[host]\nos_name = \"ubuntu\"\nos_version = \"22.04\"\n",
        )
        .unwrap();

        let config = LeanConfig::load_from(&path).unwrap();
        assert_eq!(
            config.remote.url.as_deref(),
            Some("sftp://ci@build01/srv/lean")
        );
        assert_eq!(config.host.os_version.as_deref(), Some("22.04"));
        assert!(config.cache.dir.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = LeanConfig::default();
        config.remote.url = Some("file:///a".to_string());
        config.apply_env(|key| match key {
            "LEAN_REMOTE_URL" => Some("file:///b".to_string()),
            "LEAN_TOOLCHAIN" => Some("VS2022".to_string()),
            "LEAN_CACHE_DIR" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.remote.url.as_deref(), Some("file:///b"));
        assert_eq!(config.toolchain.default.as_deref(), Some("VS2022"));
        assert!(config.cache.dir.is_none());
    }

    #[test]
    fn test_set_value_preserves_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "# my remote\n[remote]\nurl = \"file:///old\"\n").unwrap();

        set_value(&path, "remote.url", "file:///new").unwrap();
        set_value(&path, "cache.dir", "/tmp/lean-cache").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# my remote"));
        let config = LeanConfig::load_from(&path).unwrap();
        assert_eq!(config.remote.url.as_deref(), Some("file:///new"));
        assert_eq!(config.get("cache.dir").unwrap().as_deref(), Some("/tmp/lean-cache"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert!(set_value(&path, "remote.password", "hunter2").is_err());
        assert!(LeanConfig::default().get("nope").is_err());
        assert!(!path.exists());
    }
}
