//! Host OS and compiler detection.

use std::fmt;
use std::process::Command;

use lean_schema::ToolchainTag;
use tracing::debug;

use crate::config::LeanConfig;

/// Toolchain assumed on Windows hosts without a detectable Visual Studio.
pub const DEFAULT_WINDOWS_TOOLCHAIN: &str = "VS2019";

/// Toolchain assumed on every other host.
pub const DEFAULT_UNIX_TOOLCHAIN: &str = "GCC12.3.0";

/// The local operating system as used for remote directory matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOs {
    /// Lower-case OS identifier (`ubuntu`, `windows`, `macos`, ...).
    pub name: String,
    /// OS version text (`22.04`, `11`, `14`).
    pub version: String,
}

impl HostOs {
    /// Create a host description.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            version: version.into(),
        }
    }

    /// Detect the running OS, then apply `[host]` overrides from the config.
    pub fn detect(config: &LeanConfig) -> Self {
        let mut host = detect_running();
        if let Some(name) = &config.host.os_name {
            host.name = name.to_lowercase();
        }
        if let Some(version) = &config.host.os_version {
            host.version.clone_from(version);
        }
        debug!("Host OS: {host}");
        host
    }

    /// Windows and macOS are the only non-Linux families considered.
    pub fn is_linux_family(&self) -> bool {
        self.name != "windows" && self.name != "macos"
    }
}

impl fmt::Display for HostOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

fn detect_running() -> HostOs {
    match std::env::consts::OS {
        "linux" => std::fs::read_to_string("/etc/os-release")
            .map(|content| parse_os_release(&content))
            .unwrap_or_else(|_| HostOs::new("linux", "0")),
        "windows" => HostOs::new("windows", windows_release()),
        "macos" => HostOs::new("macos", macos_major()),
        other => HostOs::new(other, "0"),
    }
}

/// Parse `ID` and `VERSION_ID` from an os-release document.
pub fn parse_os_release(content: &str) -> HostOs {
    let mut id = None;
    let mut version = None;
    for line in content.lines() {
        let Some((key, val)) = line.split_once('=') else {
            continue;
        };
        let val = val.trim().trim_matches('"').trim_matches('\'');
        match key.trim() {
            "ID" => id = Some(val.to_string()),
            "VERSION_ID" => version = Some(val.to_string()),
            _ => {}
        }
    }
    HostOs::new(
        id.unwrap_or_else(|| "linux".to_string()),
        version.unwrap_or_else(|| "0".to_string()),
    )
}

/// Map a Windows build string such as `10.0.22631` to the marketing release.
pub fn windows_release_from_build(build: &str) -> String {
    let build_number = build
        .split('.')
        .nth(2)
        .and_then(|b| b.trim().parse::<u32>().ok());
    match build_number {
        Some(n) if n >= 22000 => "11".to_string(),
        _ => build.split('.').next().unwrap_or("10").to_string(),
    }
}

fn windows_release() -> String {
    // `ver` prints e.g. "Microsoft Windows [Version 10.0.22631.3296]".
    let output = Command::new("cmd").args(["/C", "ver"]).output();
    let text = output
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
        .unwrap_or_default();
    let build = text
        .split_once("Version ")
        .map(|(_, rest)| rest.trim_end_matches(|c: char| !c.is_ascii_digit()))
        .unwrap_or("10");
    windows_release_from_build(build)
}

fn macos_major() -> String {
    Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .and_then(|v| v.split('.').next().map(str::to_string))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "0".to_string())
}

/// Map a `VisualStudioVersion` value (`16.0`) to a toolchain tag (`VS2019`).
pub fn visual_studio_tag(env_version: &str) -> Option<&'static str> {
    match env_version.split('.').next()? {
        "15" => Some("VS2017"),
        "16" => Some("VS2019"),
        "17" => Some("VS2022"),
        "18" => Some("VS2024"),
        _ => None,
    }
}

/// Toolchain this host builds with when nothing else is specified.
pub fn host_default_toolchain() -> ToolchainTag {
    let tag = if cfg!(windows) {
        std::env::var("VisualStudioVersion")
            .ok()
            .and_then(|v| visual_studio_tag(&v))
            .unwrap_or(DEFAULT_WINDOWS_TOOLCHAIN)
    } else {
        DEFAULT_UNIX_TOOLCHAIN
    };
    ToolchainTag::new(tag).unwrap_or_else(|_| ToolchainTag::unknown())
}

/// Configured default toolchain, or the host default.
pub fn default_toolchain(config: &LeanConfig) -> ToolchainTag {
    config
        .toolchain
        .default
        .as_deref()
        .and_then(|tc| ToolchainTag::new(tc).ok())
        .unwrap_or_else(host_default_toolchain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_os_release() {
        let content = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\nID_LIKE=debian\n";
        assert_eq!(parse_os_release(content), HostOs::new("ubuntu", "22.04"));
    }

    #[test]
    fn test_parse_os_release_without_version() {
        let host = parse_os_release("ID=arch\n");
        assert_eq!(host, HostOs::new("arch", "0"));
        assert!(host.is_linux_family());
    }

    #[test]
    fn test_windows_build_mapping() {
        assert_eq!(windows_release_from_build("10.0.22631"), "11");
        assert_eq!(windows_release_from_build("10.0.19045"), "10");
    }

    #[test]
    fn test_visual_studio_tag() {
        assert_eq!(visual_studio_tag("16.0"), Some("VS2019"));
        assert_eq!(visual_studio_tag("17.9"), Some("VS2022"));
        assert_eq!(visual_studio_tag("12.0"), None);
    }

    #[test]
    fn test_config_overrides_host() {
        let mut config = LeanConfig::default();
        config.host.os_name = Some("Mint".to_string());
        config.host.os_version = Some("21.0".to_string());
        let host = HostOs::detect(&config);
        assert_eq!(host, HostOs::new("mint", "21.0"));
    }

    #[test]
    fn test_configured_toolchain_wins() {
        let mut config = LeanConfig::default();
        config.toolchain.default = Some("vs2022".to_string());
        assert_eq!(default_toolchain(&config).as_str(), "VS2022");
    }
}
