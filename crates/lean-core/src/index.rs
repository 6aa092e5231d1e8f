//! Local and remote artifact indices.
//!
//! The local index is a scan of the cache directory, one record per
//! installed artifact directory. The remote index is a recursive listing of the
//! matched OS directory, one record per archive in a `stable` or `common`
//! channel. Both are keyed by [`ArtifactIdentity`] and rebuilt wholesale.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use lean_schema::{
    ArchiveFormat, ArtifactIdentity, ArtifactRecord, Channel, PackageName, ToolchainTag, Version,
};
use regex::Regex;
use tracing::{debug, trace};

use crate::remote::{RemoteError, RemoteFile, RemoteRepository};

static LOCAL_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[-@](VS\d+|GCC[\d.]+|CLANG[\d.]+|GCC)$").expect("suffix pattern is valid")
});

/// Split `name@version` (first `@`) or else `name-version` (last `-`).
fn split_name_version(stem: &str) -> Option<(&str, &str)> {
    stem.split_once('@').or_else(|| stem.rsplit_once('-'))
}

/// Decode a cache directory name into `(name, version, toolchain)`.
///
/// Accepts `<name>@<version>@<TC>` and `<name>-<version>-<TC>`; entries without
/// a known toolchain suffix get [`ToolchainTag::UNKNOWN`].
pub fn decode_local_dir(dir_name: &str) -> Option<(PackageName, Version, ToolchainTag)> {
    let (rest, toolchain) = match LOCAL_SUFFIX_RE.captures(dir_name) {
        Some(caps) => {
            let whole = caps.get(0)?;
            (
                &dir_name[..whole.start()],
                ToolchainTag::new(caps.get(1)?.as_str()).ok()?,
            )
        }
        None => (dir_name, ToolchainTag::unknown()),
    };
    let (name, version) = split_name_version(rest)?;
    let name = PackageName::new(name).ok()?;
    let version = Version::parse(version).ok()?;
    Some((name, version, toolchain))
}

/// Decode a remote archive path `.../<TC>/<package>/<channel>/<file>`.
///
/// The package name is the `<package>` directory; the file name only supplies
/// the version.
pub fn decode_remote_path(path: &str) -> Option<(PackageName, Version, ToolchainTag, Channel)> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let [.., toolchain, package, channel, file_name] = parts.as_slice() else {
        return None;
    };
    let channel = Channel::from_segment(channel)?;
    let toolchain = ToolchainTag::new(toolchain).ok()?;
    let name = PackageName::new(package).ok()?;

    let (stem, _) = ArchiveFormat::split(file_name)?;
    let (repeated, version) = split_name_version(stem)?;
    if repeated != name.as_str() {
        trace!("{path}: file name '{repeated}' differs from package '{name}'");
    }
    let version = Version::parse(version).ok()?;
    Some((name, version, toolchain, channel))
}

/// Installed artifacts found in the cache directory.
#[derive(Debug, Clone, Default)]
pub struct LocalIndex {
    records: HashMap<ArtifactIdentity, ArtifactRecord>,
}

impl LocalIndex {
    /// Scan `cache_dir`. A missing directory yields an empty index.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory exists but cannot be read.
    pub fn scan(cache_dir: &Path) -> std::io::Result<Self> {
        let mut records = HashMap::new();
        if !cache_dir.is_dir() {
            return Ok(Self { records });
        }

        for entry in std::fs::read_dir(cache_dir)? {
            let entry = entry?;
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().to_string();
            let Some((name, version, toolchain)) = decode_local_dir(&dir_name) else {
                trace!("Skipping foreign cache entry {dir_name}");
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH), DateTime::from);
            let origin = entry.path().display().to_string();
            let Ok(record) = ArtifactRecord::new(name, version, toolchain, None, origin, modified)
            else {
                continue;
            };
            records.insert(record.identity.clone(), record);
        }

        debug!("Local index: {} artifacts in {}", records.len(), cache_dir.display());
        Ok(Self { records })
    }

    /// Build an index from records directly.
    pub fn from_records(records: impl IntoIterator<Item = ArtifactRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| (r.identity.clone(), r))
                .collect(),
        }
    }

    /// Look up an artifact by identity.
    pub fn get(&self, id: &ArtifactIdentity) -> Option<&ArtifactRecord> {
        self.records.get(id)
    }

    /// Every installed record for `name`.
    pub fn by_name<'s, 'n>(
        &'s self,
        name: &'n str,
    ) -> impl Iterator<Item = &'s ArtifactRecord> + use<'s, 'n> {
        self.records.values().filter(move |r| r.name().as_str() == name)
    }

    /// Find the installed directory owning `name` (and `version` if given).
    ///
    /// Without a version the highest installed version wins. Records built with
    /// `preferred` are chosen over other toolchains.
    pub fn find_owner(
        &self,
        name: &str,
        version: Option<&Version>,
        preferred: &ToolchainTag,
    ) -> Option<&ArtifactRecord> {
        fn best<'r>(pool: &[&'r ArtifactRecord]) -> Option<&'r ArtifactRecord> {
            pool.iter().copied().max_by(|a, b| {
                a.version
                    .cmp(&b.version)
                    .then_with(|| b.identity.to_string().cmp(&a.identity.to_string()))
            })
        }

        let candidates: Vec<&ArtifactRecord> = self
            .by_name(name)
            .filter(|r| version.is_none_or(|v| &r.version == v))
            .collect();
        let preferred_pool: Vec<&ArtifactRecord> = candidates
            .iter()
            .copied()
            .filter(|r| r.toolchain() == preferred)
            .collect();
        best(&preferred_pool).or_else(|| best(&candidates))
    }

    /// Root directory of an installed record.
    pub fn root_of(record: &ArtifactRecord) -> PathBuf {
        PathBuf::from(&record.origin)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, sorted by identity text.
    pub fn records(&self) -> Vec<&ArtifactRecord> {
        let mut all: Vec<&ArtifactRecord> = self.records.values().collect();
        all.sort_by_key(|r| r.identity.to_string());
        all
    }
}

/// Artifacts available in the matched remote OS directory.
#[derive(Debug, Clone, Default)]
pub struct RemoteIndex {
    by_name: BTreeMap<PackageName, Vec<ArtifactRecord>>,
    by_identity: HashMap<ArtifactIdentity, ArtifactRecord>,
}

impl RemoteIndex {
    /// List `os_dir` recursively on `remote` and decode every archive.
    ///
    /// # Errors
    ///
    /// Propagates transport errors from the listing.
    pub async fn scan(remote: &dyn RemoteRepository, os_dir: &str) -> Result<Self, RemoteError> {
        let files = remote.list_files(os_dir).await?;
        let index = Self::from_files(&files);
        debug!(
            "Remote index: {} artifacts across {} packages under {os_dir}",
            index.by_identity.len(),
            index.by_name.len()
        );
        Ok(index)
    }

    /// Decode a file listing; non-archives and unknown channels are ignored.
    pub fn from_files(files: &[RemoteFile]) -> Self {
        Self::from_records(files.iter().filter_map(|file| {
            let (name, version, toolchain, channel) = decode_remote_path(&file.path)?;
            ArtifactRecord::new(
                name,
                version,
                toolchain,
                Some(channel),
                file.path.clone(),
                file.modified,
            )
            .ok()
        }))
    }

    /// Build an index from records directly.
    pub fn from_records(records: impl IntoIterator<Item = ArtifactRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            // Same identity in both channels: stable wins.
            if let Some(existing) = index.by_identity.get(&record.identity) {
                if existing.is_stable() || !record.is_stable() {
                    continue;
                }
            }
            index
                .by_identity
                .insert(record.identity.clone(), record.clone());
        }
        for record in index.by_identity.values() {
            index
                .by_name
                .entry(record.name().clone())
                .or_default()
                .push(record.clone());
        }
        for versions in index.by_name.values_mut() {
            versions.sort_by(|a, b| {
                b.version
                    .cmp(&a.version)
                    .then_with(|| a.identity.to_string().cmp(&b.identity.to_string()))
            });
        }
        index
    }

    /// Whether any artifact of `name` exists.
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All artifacts of `name`, highest version first.
    pub fn versions(&self, name: &str) -> &[ArtifactRecord] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }

    /// Look up an artifact by identity.
    pub fn get(&self, id: &ArtifactIdentity) -> Option<&ArtifactRecord> {
        self.by_identity.get(id)
    }

    /// Package names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.by_name.keys()
    }

    /// Number of artifacts.
    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }
}
