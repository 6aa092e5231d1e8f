//! Persistent search-path registration for artifact `bin/` directories.
//!
//! On Unix hosts directories are appended to a profile script as
//! `export PATH="$PATH:<dir>"` lines; on Windows the machine `Path` value in
//! the registry is extended through `reg.exe`. Both need elevated privileges,
//! which are checked before anything is written.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use lean_schema::{DependencyDirective, PackageRequirement, ToolchainTag};
use thiserror::Error;
use tracing::debug;

use crate::config::LeanConfig;
use crate::index::LocalIndex;

/// Failures reading or changing the persistent search path.
#[derive(Error, Debug)]
pub enum HostError {
    /// The current user may not modify the path.
    #[error("Updating the system PATH requires elevated privileges ({0})")]
    PrivilegeRequired(String),

    /// The profile script could not be read or written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A helper command exited unsuccessfully.
    #[error("{0}")]
    Command(String),
}

/// The host's persistent executable search path.
pub trait HostIntegration: Send + Sync {
    /// Directories already on the persistent path.
    fn persistent_path(&self) -> Result<Vec<PathBuf>, HostError>;

    /// Append `dir` to the persistent path.
    fn append_persistent_path(&self, dir: &Path) -> Result<(), HostError>;

    /// Fail with [`HostError::PrivilegeRequired`] when the path cannot be changed.
    fn require_elevated_privilege(&self) -> Result<(), HostError>;
}

/// Unix profile-script implementation.
#[derive(Debug, Clone)]
pub struct ProfileScript {
    script: PathBuf,
    session_path: Vec<PathBuf>,
}

impl ProfileScript {
    /// Use `script`, treating the current process `PATH` as already registered.
    pub fn new(script: PathBuf) -> Self {
        let session_path = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        Self::with_session_path(script, session_path)
    }

    /// Use `script` with an explicit session `PATH`.
    pub fn with_session_path(script: PathBuf, session_path: Vec<PathBuf>) -> Self {
        Self {
            script,
            session_path,
        }
    }

    /// The profile script that receives `export PATH` lines.
    pub fn script(&self) -> &Path {
        &self.script
    }

    fn script_entries(&self) -> Result<Vec<PathBuf>, HostError> {
        let content = match std::fs::read_to_string(&self.script) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content.lines().filter_map(parse_export_line).collect())
    }
}

/// Extract the directory from `export PATH="$PATH:<dir>"` (quotes optional).
pub fn parse_export_line(line: &str) -> Option<PathBuf> {
    let rest = line.trim().strip_prefix("export PATH=")?;
    let unquoted: String = rest.chars().filter(|c| *c != '"' && *c != '\'').collect();
    let dir = unquoted
        .strip_prefix("$PATH:")
        .or_else(|| unquoted.strip_prefix("${PATH}:"))?;
    (!dir.is_empty()).then(|| PathBuf::from(dir))
}

fn is_permission_denied(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::PermissionDenied
}

impl HostIntegration for ProfileScript {
    fn persistent_path(&self) -> Result<Vec<PathBuf>, HostError> {
        let mut dirs = self.session_path.clone();
        dirs.extend(self.script_entries()?);
        Ok(dirs)
    }

    fn append_persistent_path(&self, dir: &Path) -> Result<(), HostError> {
        let needs_newline = std::fs::read(&self.script)
            .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
            .unwrap_or(false);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.script)
            .map_err(|e| {
                if is_permission_denied(&e) {
                    HostError::PrivilegeRequired(format!("cannot write {}", self.script.display()))
                } else {
                    e.into()
                }
            })?;
        if needs_newline {
            writeln!(file)?;
        }
        writeln!(file, "export PATH=\"$PATH:{}\"", dir.display())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.script, std::fs::Permissions::from_mode(0o644))?;
        }
        Ok(())
    }

    fn require_elevated_privilege(&self) -> Result<(), HostError> {
        let denied = || HostError::PrivilegeRequired(format!("cannot write {}", self.script.display()));
        if self.script.exists() {
            return match OpenOptions::new().append(true).open(&self.script) {
                Ok(_) => Ok(()),
                Err(e) if is_permission_denied(&e) => Err(denied()),
                Err(e) => Err(e.into()),
            };
        }
        let parent = self
            .script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        match tempfile::NamedTempFile::new_in(parent) {
            Ok(_) => Ok(()),
            Err(e) if is_permission_denied(&e) => Err(denied()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Windows machine-environment implementation.
#[cfg(windows)]
#[derive(Debug, Clone, Default)]
pub struct WindowsRegistry;

#[cfg(windows)]
const ENVIRONMENT_KEY: &str = r"HKLM\SYSTEM\CurrentControlSet\Control\Session Manager\Environment";

#[cfg(windows)]
impl WindowsRegistry {
    fn read_value() -> Result<String, HostError> {
        let output = std::process::Command::new("reg")
            .args(["query", ENVIRONMENT_KEY, "/v", "Path"])
            .output()?;
        if !output.status.success() {
            return Ok(String::new());
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text
            .lines()
            .find_map(|line| {
                let line = line.trim();
                let (_, value) = line.split_once("REG_EXPAND_SZ").or_else(|| line.split_once("REG_SZ"))?;
                Some(value.trim().to_string())
            })
            .unwrap_or_default())
    }
}

#[cfg(windows)]
impl HostIntegration for WindowsRegistry {
    fn persistent_path(&self) -> Result<Vec<PathBuf>, HostError> {
        Ok(Self::read_value()?
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    fn append_persistent_path(&self, dir: &Path) -> Result<(), HostError> {
        let mut value = Self::read_value()?;
        if !value.is_empty() && !value.ends_with(';') {
            value.push(';');
        }
        value.push_str(&dir.display().to_string());
        let status = std::process::Command::new("reg")
            .args(["add", ENVIRONMENT_KEY, "/v", "Path", "/t", "REG_EXPAND_SZ", "/d"])
            .arg(&value)
            .arg("/f")
            .status()?;
        if !status.success() {
            return Err(HostError::Command(format!("reg add exited with {status}")));
        }
        Ok(())
    }

    fn require_elevated_privilege(&self) -> Result<(), HostError> {
        // `net session` only succeeds from an elevated prompt.
        let elevated = std::process::Command::new("net")
            .arg("session")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok_and(|s| s.success());
        if elevated {
            Ok(())
        } else {
            Err(HostError::PrivilegeRequired(
                "run from an Administrator prompt".to_string(),
            ))
        }
    }
}

/// The integration for the running host.
pub fn system_host(config: &LeanConfig) -> Box<dyn HostIntegration> {
    #[cfg(windows)]
    {
        let _ = config;
        Box::new(WindowsRegistry)
    }
    #[cfg(not(windows))]
    {
        Box::new(ProfileScript::new(config.profile_script()))
    }
}

fn normalize(path: &Path) -> String {
    let text = path.to_string_lossy();
    let trimmed = text.trim_end_matches(['/', '\\']);
    if cfg!(windows) {
        trimmed.replace('/', "\\").to_lowercase()
    } else {
        trimmed.to_string()
    }
}

/// `bin/` directories of installed requirements that carry no directives.
pub fn bin_dirs(
    requirements: &[PackageRequirement],
    directives: &BTreeMap<PackageRequirement, Vec<DependencyDirective>>,
    local: &LocalIndex,
    target: &ToolchainTag,
) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for requirement in requirements {
        if directives.get(requirement).is_some_and(|d| !d.is_empty()) {
            continue;
        }
        let Some(record) = local.find_owner(&requirement.name, requirement.version.as_ref(), target)
        else {
            continue;
        };
        let bin = LocalIndex::root_of(record).join("bin");
        if bin.is_dir() && !dirs.contains(&bin) {
            dirs.push(bin);
        }
    }
    dirs
}

/// Outcome of [`register_bin_dirs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRegistration {
    /// Directories newly appended to the path.
    pub added: Vec<PathBuf>,
    /// Directories that were already registered.
    pub already_present: Vec<PathBuf>,
    /// Set when registration was skipped for lack of privilege.
    pub denied: Option<String>,
}

/// Directories from `dirs` missing from the persistent path.
///
/// # Errors
///
/// Propagates failures reading the persistent path.
pub fn verify_path_registration(
    host: &dyn HostIntegration,
    dirs: &[PathBuf],
) -> Result<Vec<PathBuf>, HostError> {
    let current: Vec<String> = host.persistent_path()?.iter().map(|p| normalize(p)).collect();
    Ok(dirs
        .iter()
        .filter(|d| !current.contains(&normalize(d)))
        .cloned()
        .collect())
}

/// Append every directory in `dirs` that is not yet registered.
///
/// Nothing is written when the privilege check fails; the denial is returned
/// in [`PathRegistration::denied`].
///
/// # Errors
///
/// Propagates I/O and command failures other than missing privilege.
pub fn register_bin_dirs(
    host: &dyn HostIntegration,
    dirs: &[PathBuf],
) -> Result<PathRegistration, HostError> {
    let missing = verify_path_registration(host, dirs)?;
    let mut registration = PathRegistration {
        already_present: dirs
            .iter()
            .filter(|d| !missing.contains(*d))
            .cloned()
            .collect(),
        ..PathRegistration::default()
    };
    if missing.is_empty() {
        return Ok(registration);
    }

    match host.require_elevated_privilege() {
        Ok(()) => {}
        Err(HostError::PrivilegeRequired(reason)) => {
            registration.denied = Some(reason);
            return Ok(registration);
        }
        Err(e) => return Err(e),
    }

    for dir in missing {
        debug!("Registering {} on PATH", dir.display());
        host.append_persistent_path(&dir)?;
        registration.added.push(dir);
    }
    Ok(registration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{parse_directive, parse_requirement};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeHost {
        path: Mutex<Vec<PathBuf>>,
        deny: bool,
    }

    impl HostIntegration for FakeHost {
        fn persistent_path(&self) -> Result<Vec<PathBuf>, HostError> {
            Ok(self.path.lock().unwrap().clone())
        }

        fn append_persistent_path(&self, dir: &Path) -> Result<(), HostError> {
            self.path.lock().unwrap().push(dir.to_path_buf());
            Ok(())
        }

        fn require_elevated_privilege(&self) -> Result<(), HostError> {
            if self.deny {
                Err(HostError::PrivilegeRequired("not root".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_parse_export_line() {
        assert_eq!(
            parse_export_line("export PATH=\"$PATH:/opt/lean/zlib/bin\""),
            Some(PathBuf::from("/opt/lean/zlib/bin"))
        );
        assert_eq!(
            parse_export_line("export PATH=$PATH:\"/opt/a b/bin\""),
            Some(PathBuf::from("/opt/a b/bin"))
        );
        assert_eq!(parse_export_line("# comment"), None);
        assert_eq!(parse_export_line("export PATH=/usr/bin"), None);
    }

    #[test]
    fn test_profile_script_round_trip() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("lean_paths.sh");
        std::fs::write(&script, "# managed by lean").unwrap();
        let host = ProfileScript::with_session_path(script.clone(), vec![PathBuf::from("/usr/bin")]);

        host.require_elevated_privilege().unwrap();
        host.append_persistent_path(Path::new("/opt/zlib/bin")).unwrap();

        let content = std::fs::read_to_string(&script).unwrap();
        assert_eq!(content, "# managed by lean\nexport PATH=\"$PATH:/opt/zlib/bin\"\n");
        assert_eq!(
            host.persistent_path().unwrap(),
            vec![PathBuf::from("/usr/bin"), PathBuf::from("/opt/zlib/bin")]
        );
    }

    #[test]
    fn test_register_skips_present_and_reports_added() {
        let host = FakeHost {
            path: Mutex::new(vec![PathBuf::from("/c/zlib/bin/")]),
            deny: false,
        };
        let dirs = [PathBuf::from("/c/zlib/bin"), PathBuf::from("/c/curl/bin")];

        let registration = register_bin_dirs(&host, &dirs).unwrap();

        assert_eq!(registration.added, vec![PathBuf::from("/c/curl/bin")]);
        assert_eq!(registration.already_present, vec![PathBuf::from("/c/zlib/bin")]);
        assert!(verify_path_registration(&host, &dirs).unwrap().is_empty());
    }

    #[test]
    fn test_missing_privilege_changes_nothing() {
        let host = FakeHost {
            deny: true,
            ..FakeHost::default()
        };
        let dirs = [PathBuf::from("/c/curl/bin")];

        let registration = register_bin_dirs(&host, &dirs).unwrap();

        assert!(registration.added.is_empty());
        assert_eq!(registration.denied.as_deref(), Some("not root"));
        assert!(host.persistent_path().unwrap().is_empty());
    }

    #[test]
    fn test_directive_owners_are_not_path_candidates() {
        let cache = TempDir::new().unwrap();
        for dir in ["zlib@1.3@VS2019/bin", "opencv@4.5@VS2019/bin", "boost@1.82@VS2019/include"] {
            std::fs::create_dir_all(cache.path().join(dir)).unwrap();
        }
        let local = LocalIndex::scan(cache.path()).unwrap();
        let requirements: Vec<PackageRequirement> = ["zlib", "opencv", "boost", "curl"]
            .iter()
            .map(|r| parse_requirement(r).unwrap())
            .collect();
        let mut directives = BTreeMap::new();
        directives.insert(
            parse_requirement("opencv").unwrap(),
            vec![parse_directive("copy bin/*.dll to ./").unwrap()],
        );

        let dirs = bin_dirs(&requirements, &directives, &local, &ToolchainTag::new("VS2019").unwrap());

        assert_eq!(dirs, vec![cache.path().join("zlib@1.3@VS2019").join("bin")]);
    }
}
