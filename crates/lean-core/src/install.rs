//! Fetch & install pipeline.
//!
//! Each artifact goes through download, provenance logging, extraction into a
//! staging directory, and a final move to `<cache>/<name>@<version>@<TC>`. A
//! failure is recorded on that artifact and the batch moves on.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use lean_schema::{ArtifactIdentity, ArtifactRecord};
use thiserror::Error;
use tracing::{debug, warn};

use crate::index::decode_local_dir;
use crate::io::download::download_artifact;
use crate::io::extract::{ExtractError, extract_archive, strip_wrapper_dir};
use crate::paths::STAGING_PREFIX;
use crate::provenance::{self, ProvenanceEntry};
use crate::remote::RemoteRepository;
use crate::reporter::Reporter;

#[derive(Error, Debug)]
enum UnpackError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive is empty")]
    Empty,
}

/// Result of installing one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The artifact now sits in its canonical cache directory.
    Installed {
        /// What was installed.
        identity: ArtifactIdentity,
        /// The canonical cache directory.
        path: PathBuf,
        /// Archive size as downloaded.
        bytes: u64,
    },
    /// The archive could not be downloaded.
    FetchFailed {
        /// What was requested.
        identity: ArtifactIdentity,
        /// Rendered download error.
        reason: String,
    },
    /// The archive arrived but could not be unpacked or moved into place.
    ExtractFailed {
        /// What was requested.
        identity: ArtifactIdentity,
        /// Rendered extraction error.
        reason: String,
    },
}

impl InstallOutcome {
    /// The artifact this outcome is about, whatever happened.
    pub fn identity(&self) -> &ArtifactIdentity {
        match self {
            Self::Installed { identity, .. }
            | Self::FetchFailed { identity, .. }
            | Self::ExtractFailed { identity, .. } => identity,
        }
    }

    /// `true` only for [`InstallOutcome::Installed`].
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed { identity, .. } => write!(f, "{identity}: installed"),
            Self::FetchFailed { identity, reason } => write!(f, "{identity}: fetch failed ({reason})"),
            Self::ExtractFailed { identity, reason } => {
                write!(f, "{identity}: extract failed ({reason})")
            }
        }
    }
}

/// Remove every cache directory that decodes to `identity`.
fn remove_existing(cache_dir: &Path, identity: &ArtifactIdentity) -> std::io::Result<()> {
    let Ok(entries) = std::fs::read_dir(cache_dir) else {
        return Ok(());
    };
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some((pkg, version, toolchain)) = decode_local_dir(&name) else {
            continue;
        };
        let same = pkg == *identity.name()
            && version.as_str() == identity.version_str()
            && toolchain == *identity.toolchain();
        if same && entry.path().is_dir() {
            debug!("Removing previous install {}", entry.path().display());
            std::fs::remove_dir_all(entry.path())?;
        }
    }
    Ok(())
}

/// Extract `archive` into `staging`, flatten a wrapper directory, and move the
/// result to `target`.
fn unpack(archive: &Path, staging: &Path, target: &Path) -> Result<(), UnpackError> {
    if staging.exists() {
        std::fs::remove_dir_all(staging)?;
    }
    std::fs::create_dir_all(staging)?;

    let files = extract_archive(archive, staging)?;
    if files.is_empty() && std::fs::read_dir(staging)?.next().is_none() {
        return Err(UnpackError::Empty);
    }
    strip_wrapper_dir(staging)?;

    if std::fs::rename(staging, target).is_err() {
        std::fs::create_dir_all(target)?;
        let options = fs_extra::dir::CopyOptions::new().content_only(true);
        fs_extra::dir::copy(staging, target, &options)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
    }
    Ok(())
}

/// Download and install one artifact into `cache_dir`.
pub async fn install_artifact(
    remote: &dyn RemoteRepository,
    cache_dir: &Path,
    record: &ArtifactRecord,
    reporter: &dyn Reporter,
) -> InstallOutcome {
    let identity = record.identity.clone();
    let archive = cache_dir.join(record.file_name());

    let bytes = match download_artifact(remote, &record.origin, &archive, &identity, reporter).await
    {
        Ok(bytes) => bytes,
        Err(e) => {
            let reason = e.to_string();
            reporter.failed(&identity, &reason);
            return InstallOutcome::FetchFailed { identity, reason };
        }
    };

    let entry = ProvenanceEntry {
        artifact: identity.to_string(),
        installed_at: Utc::now(),
    };
    if let Err(e) = provenance::append(cache_dir, &entry) {
        warn!("Could not record provenance for {identity}: {e}");
    }

    reporter.extracting(&identity);
    let target = cache_dir.join(identity.dir_name());
    let staging = cache_dir.join(format!("{STAGING_PREFIX}{}", identity.dir_name()));

    let unpacked = {
        let cache_dir = cache_dir.to_path_buf();
        let identity = identity.clone();
        let archive = archive.clone();
        let staging = staging.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || -> Result<(), UnpackError> {
            remove_existing(&cache_dir, &identity)?;
            unpack(&archive, &staging, &target)
        })
        .await
    };

    std::fs::remove_file(&archive).ok();
    if staging.exists() {
        std::fs::remove_dir_all(&staging).ok();
    }

    let failure = match unpacked {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(join) => Some(join.to_string()),
    };
    if let Some(reason) = failure {
        if target.exists() {
            std::fs::remove_dir_all(&target).ok();
        }
        reporter.failed(&identity, &reason);
        return InstallOutcome::ExtractFailed { identity, reason };
    }

    reporter.done(&identity, "installed", Some(bytes));
    InstallOutcome::Installed {
        identity,
        path: target,
        bytes,
    }
}

/// Install every record in `plan`, one after another.
pub async fn install_all(
    remote: &dyn RemoteRepository,
    cache_dir: &Path,
    plan: &[ArtifactRecord],
    reporter: &dyn Reporter,
) -> Vec<InstallOutcome> {
    let mut outcomes = Vec::with_capacity(plan.len());
    for record in plan {
        outcomes.push(install_artifact(remote, cache_dir, record, reporter).await);
    }
    outcomes
}
