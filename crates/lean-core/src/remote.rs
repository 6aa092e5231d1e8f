//! Remote artifact repository access.
//!
//! [`RemoteRepository`] is the narrow surface the engine needs: list
//! directories, list files with modification times, read small files and read
//! ranges of large ones. [`RemoteSession`] implements it on top of an `opendal`
//! operator, either over SFTP or over a directory path (mounted share or local
//! mirror).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opendal::{EntryMode, ErrorKind, Metakey, Operator};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::RemoteConfig;

/// Failures talking to the remote repository.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// `remote.url` is unset.
    #[error("Remote repository is not configured. Run `lean config set remote.url <url>`.")]
    NotConfigured,

    /// The url scheme is neither `sftp://`, `file://` nor a plain path.
    #[error("Unsupported remote url '{0}'")]
    UnsupportedUrl(String),

    /// The session could not be opened or was lost.
    #[error("Connection to {endpoint} failed: {reason}")]
    Connection {
        /// Rendered remote location.
        endpoint: String,
        /// Backend error text.
        reason: String,
    },

    /// The path does not exist on the remote.
    #[error("Remote path not found: {0}")]
    NotFound(String),

    /// Any other backend failure on a path.
    #[error("Remote error on '{path}': {source}")]
    Transport {
        /// Remote path being accessed.
        path: String,
        /// Underlying backend error.
        #[source]
        source: opendal::Error,
    },
}

impl RemoteError {
    fn from_opendal(path: &str, err: opendal::Error) -> Self {
        if err.kind() == ErrorKind::NotFound {
            Self::NotFound(path.to_string())
        } else {
            Self::Transport {
                path: path.to_string(),
                source: err,
            }
        }
    }
}

/// A file found while listing the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time; the Unix epoch when the backend does not report one.
    pub modified: DateTime<Utc>,
}

/// Read-only view of the prebuilt package store.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Human readable location, used in messages.
    fn describe(&self) -> String;

    /// Names of the directories directly below `dir` (`""` is the root).
    async fn list_dirs(&self, dir: &str) -> Result<Vec<String>, RemoteError>;

    /// Every file below `dir`, recursively.
    async fn list_files(&self, dir: &str) -> Result<Vec<RemoteFile>, RemoteError>;

    /// Size of the file at `path`.
    async fn file_size(&self, path: &str) -> Result<u64, RemoteError>;

    /// Read `len` bytes starting at `offset`.
    async fn read_range(&self, path: &str, offset: u64, len: u64) -> Result<Vec<u8>, RemoteError>;

    /// Read a whole file, or `None` when it does not exist.
    async fn read_optional(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteError>;
}

/// Where a remote url points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLocation {
    /// Directory reachable through the local filesystem.
    Directory(String),
    /// SFTP server.
    Sftp {
        /// Login name; the configured or current user when absent.
        user: Option<String>,
        /// Server host name.
        host: String,
        /// Server port, 22 unless given.
        port: u16,
        /// Repository root on the server.
        root: String,
    },
}

impl RemoteLocation {
    /// Parse `sftp://[user@]host[:port]/root`, `file:///root` or a plain path.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::UnsupportedUrl`] for other schemes or a missing host.
    pub fn parse(url: &str) -> Result<Self, RemoteError> {
        let unsupported = || RemoteError::UnsupportedUrl(url.to_string());

        if let Some(rest) = url.strip_prefix("file://") {
            return Ok(Self::Directory(rest.to_string()));
        }
        let Some(rest) = url.strip_prefix("sftp://") else {
            if url.contains("://") {
                return Err(unsupported());
            }
            return Ok(Self::Directory(url.to_string()));
        };

        let (authority, root) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        let (user, host_port) = match authority.rsplit_once('@') {
            Some((user, host)) => (Some(user.to_string()), host),
            None => (None, authority),
        };
        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| unsupported())?),
            None => (host_port, 22),
        };
        if host.is_empty() {
            return Err(unsupported());
        }
        Ok(Self::Sftp {
            user,
            host: host.to_string(),
            port,
            root: root.to_string(),
        })
    }
}

/// An open connection to the artifact repository.
///
/// Created once per synchronization run and closed when dropped.
#[derive(Debug)]
pub struct RemoteSession {
    op: Operator,
    endpoint: String,
}

impl RemoteSession {
    /// Open a session from the `[remote]` configuration and verify it is reachable.
    ///
    /// # Errors
    ///
    /// [`RemoteError::NotConfigured`] without a url, [`RemoteError::UnsupportedUrl`]
    /// for unknown schemes and [`RemoteError::Connection`] when the remote cannot
    /// be reached or authentication fails.
    pub async fn connect(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let url = config.url.as_deref().ok_or(RemoteError::NotConfigured)?;
        let location = RemoteLocation::parse(url)?;
        let endpoint = url.to_string();

        let connection_failed = |e: opendal::Error| RemoteError::Connection {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        };

        let op = match &location {
            RemoteLocation::Directory(root) => {
                let mut builder = opendal::services::Fs::default();
                builder.root(root);
                Operator::new(builder).map_err(connection_failed)?.finish()
            }
            RemoteLocation::Sftp { .. } => sftp_operator(&location, config, &endpoint)?,
        };

        op.check().await.map_err(connection_failed)?;
        info!("Opened remote session to {endpoint}");
        Ok(Self { op, endpoint })
    }
}

#[cfg(all(feature = "sftp", unix))]
fn sftp_operator(
    location: &RemoteLocation,
    config: &RemoteConfig,
    endpoint: &str,
) -> Result<Operator, RemoteError> {
    let RemoteLocation::Sftp {
        user,
        host,
        port,
        root,
    } = location
    else {
        return Err(RemoteError::UnsupportedUrl(endpoint.to_string()));
    };

    let mut builder = opendal::services::Sftp::default();
    builder.endpoint(&format!("ssh://{host}:{port}"));
    builder.root(root);
    if let Some(user) = user {
        builder.user(user);
    }
    if let Some(key) = &config.key {
        builder.key(&key.display().to_string());
    }
    if let Some(policy) = &config.known_hosts {
        builder.known_hosts_strategy(policy);
    }

    Operator::new(builder)
        .map(|b| b.finish())
        .map_err(|e| RemoteError::Connection {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(not(all(feature = "sftp", unix)))]
fn sftp_operator(
    _location: &RemoteLocation,
    _config: &RemoteConfig,
    endpoint: &str,
) -> Result<Operator, RemoteError> {
    Err(RemoteError::UnsupportedUrl(format!(
        "{endpoint} (sftp support is not available in this build)"
    )))
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        debug!("Closing remote session to {}", self.endpoint);
    }
}

fn dir_path(dir: &str) -> String {
    let trimmed = dir.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("{trimmed}/")
    }
}

#[async_trait]
impl RemoteRepository for RemoteSession {
    fn describe(&self) -> String {
        self.endpoint.clone()
    }

    async fn list_dirs(&self, dir: &str) -> Result<Vec<String>, RemoteError> {
        let path = dir_path(dir);
        let entries = self
            .op
            .list_with(&path)
            .metakey(Metakey::Mode)
            .await
            .map_err(|e| RemoteError::from_opendal(&path, e))?;

        let mut dirs: Vec<String> = entries
            .into_iter()
            .filter(|e| e.metadata().mode() == EntryMode::DIR && e.path() != path)
            .map(|e| e.name().trim_end_matches('/').to_string())
            .filter(|name| !name.is_empty())
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<RemoteFile>, RemoteError> {
        let path = dir_path(dir);
        let entries = self
            .op
            .list_with(&path)
            .recursive(true)
            .metakey(Metakey::Mode | Metakey::ContentLength | Metakey::LastModified)
            .await
            .map_err(|e| RemoteError::from_opendal(&path, e))?;

        Ok(entries
            .into_iter()
            .filter(|e| e.metadata().mode() == EntryMode::FILE)
            .map(|e| RemoteFile {
                path: e.path().to_string(),
                size: e.metadata().content_length(),
                modified: e
                    .metadata()
                    .last_modified()
                    .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH)),
            })
            .collect())
    }

    async fn file_size(&self, path: &str) -> Result<u64, RemoteError> {
        let meta = self
            .op
            .stat(path)
            .await
            .map_err(|e| RemoteError::from_opendal(path, e))?;
        Ok(meta.content_length())
    }

    async fn read_range(&self, path: &str, offset: u64, len: u64) -> Result<Vec<u8>, RemoteError> {
        self.op
            .read_with(path)
            .range(offset..offset + len)
            .await
            .map_err(|e| RemoteError::from_opendal(path, e))
    }

    async fn read_optional(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        match self.op.read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RemoteError::from_opendal(path, e)),
        }
    }
}
