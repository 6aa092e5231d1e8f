//! Per-run resolution state.
//!
//! A [`SyncSession`] owns the remote connection and every cache the engine
//! builds while it runs: the matched OS directory, both artifact indices and
//! resolved manifest graphs. Dropping the session closes the connection.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lean_schema::{PackageRequirement, ToolchainTag};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LeanConfig;
use crate::diff::{self, DiffReport};
use crate::graph::{self, ResolvedManifest};
use crate::index::{LocalIndex, RemoteIndex};
use crate::locator::{self, LocateError, MatchConfidence, OsMatch};
use crate::paths::IMPORT_CMAKE;
use crate::platform::{self, HostOs};
use crate::remote::{RemoteError, RemoteRepository, RemoteSession};
use crate::reporter::Reporter;

/// Failures that abort a whole run.
///
/// Per-artifact problems are collected in the summary instead.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote could not be reached or dropped the connection.
    #[error(transparent)]
    Connection(#[from] RemoteError),

    /// No remote OS directory fits this host.
    #[error(transparent)]
    NoRemoteMatch(#[from] LocateError),

    /// The cache directory could not be determined.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or writing the cache failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

type ResolutionKey = (Vec<PathBuf>, bool);

/// One command's view of the remote, the local cache and the host.
///
/// Indexes and manifest resolutions are built on first use and reused for the
/// rest of the command.
pub struct SyncSession {
    remote: Box<dyn RemoteRepository>,
    cache_dir: PathBuf,
    host: HostOs,
    default_toolchain: ToolchainTag,
    os_match: Option<OsMatch>,
    local: Option<Arc<LocalIndex>>,
    remote_index: Option<Arc<RemoteIndex>>,
    resolutions: HashMap<ResolutionKey, Arc<ResolvedManifest>>,
}

impl fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSession")
            .field("cache_dir", &self.cache_dir)
            .field("host", &self.host)
            .field("default_toolchain", &self.default_toolchain)
            .field("os_match", &self.os_match)
            .field("resolutions", &self.resolutions.len())
            .finish_non_exhaustive()
    }
}

impl SyncSession {
    /// Open the configured remote and set up an empty session.
    ///
    /// # Errors
    ///
    /// [`SyncError::Config`] when the cache directory cannot be determined and
    /// [`SyncError::Connection`] when the remote cannot be reached.
    pub async fn connect(config: &LeanConfig) -> Result<Self, SyncError> {
        let cache_dir = config
            .cache_dir()
            .map_err(|e| SyncError::Config(e.to_string()))?;
        let remote = RemoteSession::connect(&config.remote).await?;
        Ok(Self::new(
            Box::new(remote),
            cache_dir,
            HostOs::detect(config),
            platform::default_toolchain(config),
        ))
    }

    /// Session over an already opened `remote`.
    pub fn new(
        remote: Box<dyn RemoteRepository>,
        cache_dir: PathBuf,
        host: HostOs,
        default_toolchain: ToolchainTag,
    ) -> Self {
        Self {
            remote,
            cache_dir,
            host,
            default_toolchain,
            os_match: None,
            local: None,
            remote_index: None,
            resolutions: HashMap::new(),
        }
    }

    /// The repository artifacts are fetched from.
    pub fn remote(&self) -> &dyn RemoteRepository {
        self.remote.as_ref()
    }

    /// Root of the local cache, one directory per installed artifact.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Detected or configured host OS.
    pub fn host(&self) -> &HostOs {
        &self.host
    }

    /// Toolchain used when neither the command line nor a manifest names one.
    pub fn default_toolchain(&self) -> &ToolchainTag {
        &self.default_toolchain
    }

    /// Pick the toolchain for a run: explicit override, then manifest tag,
    /// then the configured or host default.
    pub fn target_toolchain(
        &self,
        explicit: Option<&ToolchainTag>,
        manifest: Option<&ToolchainTag>,
    ) -> ToolchainTag {
        explicit
            .or(manifest)
            .unwrap_or(&self.default_toolchain)
            .clone()
    }

    /// The remote OS directory for this host, located once per session.
    ///
    /// Newer-version and generic Linux fallbacks are accepted with a warning.
    ///
    /// # Errors
    ///
    /// [`SyncError::Connection`] if the root cannot be listed and
    /// [`SyncError::NoRemoteMatch`] if no directory fits the host.
    pub async fn os_dir(&mut self, reporter: &dyn Reporter) -> Result<String, SyncError> {
        if let Some(found) = &self.os_match {
            return Ok(found.dir.clone());
        }

        let candidates = self.remote.list_dirs("").await?;
        debug!("Remote OS directories: {candidates:?}");
        let found = locator::find_best_os_dir(&candidates, &self.host)?;

        if found.linux_fallback {
            reporter.warning(&format!(
                "No remote directory for {}; using generic Linux build '{}'",
                self.host, found.dir
            ));
        } else if found.confidence == MatchConfidence::NewerFallback {
            reporter.warning(&format!(
                "No build for {} or older; using newer '{}', compatibility is not guaranteed",
                self.host, found.dir
            ));
        }
        info!("Using remote OS directory {}", found.dir);

        let dir = found.dir.clone();
        self.os_match = Some(found);
        Ok(dir)
    }

    /// Installed artifacts, scanned on first use.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors reading the cache directory.
    pub fn local_index(&mut self) -> Result<Arc<LocalIndex>, SyncError> {
        if let Some(local) = &self.local {
            return Ok(Arc::clone(local));
        }
        let local = Arc::new(LocalIndex::scan(&self.cache_dir)?);
        debug!("Local index: {} artifact(s)", local.len());
        self.local = Some(Arc::clone(&local));
        Ok(local)
    }

    /// Forget the local index; the next [`Self::local_index`] rescans.
    pub fn invalidate_local(&mut self) {
        self.local = None;
    }

    /// Remote artifacts under the matched OS directory, scanned on first use.
    ///
    /// # Errors
    ///
    /// See [`Self::os_dir`]; listing failures are [`SyncError::Connection`].
    pub async fn remote_index(
        &mut self,
        reporter: &dyn Reporter,
    ) -> Result<Arc<RemoteIndex>, SyncError> {
        if let Some(index) = &self.remote_index {
            return Ok(Arc::clone(index));
        }
        let os_dir = self.os_dir(reporter).await?;
        let index = Arc::new(RemoteIndex::scan(self.remote.as_ref(), &os_dir).await?);
        debug!("Remote index: {} artifact(s) under {os_dir}", index.len());
        self.remote_index = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Forget the remote index.
    pub fn refresh_remote(&mut self) {
        self.remote_index = None;
    }

    /// Discover and expand the manifests of the project at `root`.
    ///
    /// Results are cached per manifest set and `root_only` flag.
    ///
    /// # Errors
    ///
    /// See [`Self::os_dir`].
    pub async fn resolve_manifests(
        &mut self,
        root: &Path,
        selected: &[String],
        root_only: bool,
        reporter: &dyn Reporter,
    ) -> Result<Arc<ResolvedManifest>, SyncError> {
        let manifests = graph::discover_manifests(root, selected, root_only);
        let mut key_paths = manifests.clone();
        key_paths.sort();
        let key = (key_paths, root_only);

        if let Some(resolved) = self.resolutions.get(&key) {
            debug!("Reusing resolution of {} manifest(s)", manifests.len());
            return Ok(Arc::clone(resolved));
        }

        let os_dir = self.os_dir(reporter).await?;
        let resolved = Arc::new(
            graph::resolve_graph(&manifests, self.remote.as_ref(), &os_dir, reporter).await,
        );
        self.resolutions.insert(key, Arc::clone(&resolved));
        Ok(resolved)
    }

    /// Classify `requirements` against both indices.
    ///
    /// # Errors
    ///
    /// See [`Self::remote_index`] and [`Self::local_index`].
    pub async fn diff(
        &mut self,
        requirements: &[PackageRequirement],
        target: &ToolchainTag,
        reporter: &dyn Reporter,
    ) -> Result<DiffReport, SyncError> {
        let remote = self.remote_index(reporter).await?;
        let local = self.local_index()?;
        Ok(diff::diff(requirements, &remote, &local, target))
    }

    /// Copy `<os-dir>/import.cmake` into the cache root when it changed.
    ///
    /// Failures are logged and reported as `false`.
    pub async fn sync_import_cmake(&mut self, reporter: &dyn Reporter) -> bool {
        let os_dir = match self.os_dir(reporter).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Skipping {IMPORT_CMAKE}: {e}");
                return false;
            }
        };
        let remote_path = format!("{os_dir}/{IMPORT_CMAKE}");
        let content = match self.remote.read_optional(&remote_path).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                debug!("No {remote_path} on remote");
                return false;
            }
            Err(e) => {
                warn!("Cannot read {remote_path}: {e}");
                return false;
            }
        };

        let local_path = self.cache_dir.join(IMPORT_CMAKE);
        if std::fs::read(&local_path).is_ok_and(|current| current == content) {
            return false;
        }
        let written = std::fs::create_dir_all(&self.cache_dir)
            .and_then(|()| std::fs::write(&local_path, &content));
        match written {
            Ok(()) => {
                debug!("Updated {}", local_path.display());
                true
            }
            Err(e) => {
                warn!("Cannot write {}: {e}", local_path.display());
                false
            }
        }
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        debug!("Closing session for {}", self.remote.describe());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_requirement;
    use crate::reporter::NullReporter;
    use crate::testing::{MemoryRepository, RecordingReporter, ts};
    use tempfile::TempDir;

    fn session(repo: MemoryRepository, cache: &Path, host: HostOs) -> SyncSession {
        SyncSession::new(
            Box::new(repo),
            cache.to_path_buf(),
            host,
            ToolchainTag::new("GCC12.3.0").unwrap(),
        )
    }

    fn ubuntu_repo() -> MemoryRepository {
        MemoryRepository::new()
            .with_file("ubuntu-20.04/GCC12.3.0/zlib/stable/zlib@1.3.tar.gz", "x", ts(10))
            .with_file("ubuntu-22.04/GCC12.3.0/zlib/stable/zlib@1.3.tar.gz", "x", ts(10))
            .with_file("ubuntu-22.04/GCC12.3.0/curl/common/curl@8.0.tar.gz", "x", ts(10))
            .with_file("ubuntu-22.04/dep_tree/curl.dep", "zlib\n", ts(10))
            .with_file("ubuntu-22.04/import.cmake", "include(lean)\n", ts(10))
    }

    #[tokio::test]
    async fn test_os_dir_is_located_once() {
        let cache = TempDir::new().unwrap();
        let mut session = session(ubuntu_repo(), cache.path(), HostOs::new("ubuntu", "22.04"));

        assert_eq!(session.os_dir(&NullReporter).await.unwrap(), "ubuntu-22.04");
        assert_eq!(session.os_dir(&NullReporter).await.unwrap(), "ubuntu-22.04");
    }

    #[tokio::test]
    async fn test_newer_fallback_warns() {
        let cache = TempDir::new().unwrap();
        let mut session = session(ubuntu_repo(), cache.path(), HostOs::new("ubuntu", "18.04"));
        let reporter = RecordingReporter::default();

        assert_eq!(session.os_dir(&reporter).await.unwrap(), "ubuntu-20.04");
        assert_eq!(reporter.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_no_match_is_fatal() {
        let cache = TempDir::new().unwrap();
        let mut session = session(ubuntu_repo(), cache.path(), HostOs::new("windows", "10"));

        let err = session.os_dir(&NullReporter).await.unwrap_err();
        assert!(matches!(err, SyncError::NoRemoteMatch(_)));
    }

    #[tokio::test]
    async fn test_local_index_is_cached_until_invalidated() {
        let cache = TempDir::new().unwrap();
        let mut session = session(ubuntu_repo(), cache.path(), HostOs::new("ubuntu", "22.04"));

        assert!(session.local_index().unwrap().is_empty());
        std::fs::create_dir_all(cache.path().join("zlib@1.3@GCC12.3.0")).unwrap();
        assert!(session.local_index().unwrap().is_empty());

        session.invalidate_local();
        assert_eq!(session.local_index().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_is_cached_per_manifest_set() {
        let cache = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::fs::write(project.path().join("app.manifest"), "[GCC12.3.0]\ncurl\n").unwrap();
        let repo = ubuntu_repo();
        let mut session = session(repo, cache.path(), HostOs::new("ubuntu", "22.04"));
        let selected = vec!["app.manifest".to_string()];

        let first = session
            .resolve_manifests(project.path(), &selected, false, &NullReporter)
            .await
            .unwrap();
        std::fs::write(project.path().join("app.manifest"), "boost\n").unwrap();
        let second = session
            .resolve_manifests(project.path(), &selected, false, &NullReporter)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.requirements,
            vec![parse_requirement("curl").unwrap(), parse_requirement("zlib").unwrap()]
        );
        assert_eq!(first.toolchain.as_ref().map(ToolchainTag::as_str), Some("GCC12.3.0"));
    }

    #[tokio::test]
    async fn test_diff_uses_session_indices() {
        let cache = TempDir::new().unwrap();
        let mut session = session(ubuntu_repo(), cache.path(), HostOs::new("ubuntu", "22.04"));
        let target = session.target_toolchain(None, None);
        let requirements = [parse_requirement("zlib").unwrap(), parse_requirement("curl").unwrap()];

        let report = session.diff(&requirements, &target, &NullReporter).await.unwrap();

        assert_eq!(report.missing().len(), 2);
        assert!(report.unresolved().is_empty());
    }

    #[tokio::test]
    async fn test_import_cmake_copied_when_changed() {
        let cache = TempDir::new().unwrap();
        let mut session = session(ubuntu_repo(), cache.path(), HostOs::new("ubuntu", "22.04"));

        assert!(session.sync_import_cmake(&NullReporter).await);
        assert_eq!(
            std::fs::read_to_string(cache.path().join(IMPORT_CMAKE)).unwrap(),
            "include(lean)\n"
        );
        assert!(!session.sync_import_cmake(&NullReporter).await);
    }

    #[test]
    fn test_toolchain_precedence() {
        let cache = TempDir::new().unwrap();
        let session = session(MemoryRepository::new(), cache.path(), HostOs::new("ubuntu", "22.04"));
        let flag = ToolchainTag::new("GCC9").unwrap();
        let tagged = ToolchainTag::new("GCC11").unwrap();

        assert_eq!(session.target_toolchain(Some(&flag), Some(&tagged)), flag);
        assert_eq!(session.target_toolchain(None, Some(&tagged)), tagged);
        assert_eq!(session.target_toolchain(None, None).as_str(), "GCC12.3.0");
    }
}
