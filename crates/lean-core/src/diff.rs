//! Requirement resolution against the remote index and classification against
//! the local cache.

use std::collections::HashSet;
use std::fmt;

use lean_schema::{ArtifactIdentity, ArtifactRecord, PackageRequirement, ToolchainTag};

use crate::index::{LocalIndex, RemoteIndex};

/// Why a requirement could not be mapped to a remote artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// No artifact of that name exists in the OS directory.
    NotOnRemote,
    /// The name exists, but not in the requested version.
    NoMatchingVersion,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOnRemote => f.write_str("not found on remote"),
            Self::NoMatchingVersion => f.write_str("no matching version"),
        }
    }
}

/// A resolution that succeeded with relaxed toolchain matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionWarning {
    /// The pinned version exists only under another toolchain.
    ToolchainMismatch {
        /// The pinned requirement.
        requirement: PackageRequirement,
        /// Toolchain that was asked for.
        target: ToolchainTag,
        /// Toolchain the artifact was taken from.
        used: ToolchainTag,
    },
    /// The target toolchain has no artifacts of this package at all.
    NoTargetToolchain {
        /// The requirement being resolved.
        requirement: PackageRequirement,
        /// Toolchain that was asked for.
        target: ToolchainTag,
        /// Toolchain the artifact was taken from.
        used: ToolchainTag,
    },
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolchainMismatch {
                requirement,
                target,
                used,
            } => write!(
                f,
                "'{requirement}' found under {used} (target is {target}), using it"
            ),
            Self::NoTargetToolchain {
                requirement,
                target,
                used,
            } => write!(
                f,
                "No version of '{}' for {target}, using {used}",
                requirement.name
            ),
        }
    }
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The chosen remote artifact.
    pub record: ArtifactRecord,
    /// Set when the toolchain had to be relaxed.
    pub warning: Option<ResolutionWarning>,
}

fn best_by_channel<'a>(
    candidates: impl Iterator<Item = &'a ArtifactRecord> + Clone,
) -> Option<&'a ArtifactRecord> {
    // `versions()` is sorted highest first, so the first hit is the maximum.
    let mut candidates = candidates;
    candidates
        .clone()
        .find(|r| r.is_stable())
        .or_else(|| candidates.next())
}

/// Map one requirement to a remote artifact for `target`.
///
/// A pinned version matches exactly under `target`, else under any toolchain.
/// An unpinned requirement takes the highest `stable` version, falling back to
/// the highest `common` one, first among `target` artifacts and then among all.
///
/// # Errors
///
/// Returns the [`UnresolvedReason`] when nothing matches.
pub fn resolve_one(
    requirement: &PackageRequirement,
    remote: &RemoteIndex,
    target: &ToolchainTag,
) -> Result<Resolution, UnresolvedReason> {
    if !remote.contains_name(&requirement.name) {
        return Err(UnresolvedReason::NotOnRemote);
    }
    let versions = remote.versions(&requirement.name);

    if let Some(wanted) = &requirement.version {
        let same_version = || versions.iter().filter(|r| &r.version == wanted);
        if let Some(record) = best_by_channel(same_version().filter(|r| r.toolchain() == target)) {
            return Ok(Resolution {
                record: record.clone(),
                warning: None,
            });
        }
        let record = best_by_channel(same_version()).ok_or(UnresolvedReason::NoMatchingVersion)?;
        return Ok(Resolution {
            record: record.clone(),
            warning: Some(ResolutionWarning::ToolchainMismatch {
                requirement: requirement.clone(),
                target: target.clone(),
                used: record.toolchain().clone(),
            }),
        });
    }

    if let Some(record) = best_by_channel(versions.iter().filter(|r| r.toolchain() == target)) {
        return Ok(Resolution {
            record: record.clone(),
            warning: None,
        });
    }
    let record = best_by_channel(versions.iter()).ok_or(UnresolvedReason::NoMatchingVersion)?;
    Ok(Resolution {
        record: record.clone(),
        warning: Some(ResolutionWarning::NoTargetToolchain {
            requirement: requirement.clone(),
            target: target.clone(),
            used: record.toolchain().clone(),
        }),
    })
}

/// State of one requirement relative to the local cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// No remote artifact matches.
    Unresolved {
        /// The requirement as declared.
        requirement: PackageRequirement,
        /// Why nothing matched.
        reason: UnresolvedReason,
    },
    /// The resolved artifact is not installed.
    Missing {
        /// The requirement as declared.
        requirement: PackageRequirement,
        /// Artifact to install.
        remote: ArtifactRecord,
    },
    /// Installed, but the remote archive is newer.
    Stale {
        /// The requirement as declared.
        requirement: PackageRequirement,
        /// Newer remote artifact.
        remote: ArtifactRecord,
        /// Outdated cached copy.
        local: ArtifactRecord,
    },
    /// Installed and current.
    Satisfied {
        /// The requirement as declared.
        requirement: PackageRequirement,
        /// Cached copy in use.
        local: ArtifactRecord,
    },
}

impl Classification {
    /// The requirement this entry is about.
    pub fn requirement(&self) -> &PackageRequirement {
        match self {
            Self::Unresolved { requirement, .. }
            | Self::Missing { requirement, .. }
            | Self::Stale { requirement, .. }
            | Self::Satisfied { requirement, .. } => requirement,
        }
    }

    /// Identity of the resolved artifact, if any.
    pub fn identity(&self) -> Option<&ArtifactIdentity> {
        match self {
            Self::Unresolved { .. } => None,
            Self::Missing { remote, .. } | Self::Stale { remote, .. } => Some(&remote.identity),
            Self::Satisfied { local, .. } => Some(&local.identity),
        }
    }

    /// Short lower-case label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unresolved { .. } => "unresolved",
            Self::Missing { .. } => "missing",
            Self::Stale { .. } => "stale",
            Self::Satisfied { .. } => "satisfied",
        }
    }
}

/// Resolve `requirement` and classify it against `local`.
pub fn classify(
    requirement: &PackageRequirement,
    remote: &RemoteIndex,
    local: &LocalIndex,
    target: &ToolchainTag,
) -> (Classification, Option<ResolutionWarning>) {
    let resolution = match resolve_one(requirement, remote, target) {
        Ok(resolution) => resolution,
        Err(reason) => {
            return (
                Classification::Unresolved {
                    requirement: requirement.clone(),
                    reason,
                },
                None,
            );
        }
    };

    let remote_record = resolution.record;
    let classification = match local.get(&remote_record.identity) {
        None => Classification::Missing {
            requirement: requirement.clone(),
            remote: remote_record,
        },
        Some(installed) if remote_record.timestamp > installed.timestamp => Classification::Stale {
            requirement: requirement.clone(),
            remote: remote_record,
            local: installed.clone(),
        },
        Some(installed) => Classification::Satisfied {
            requirement: requirement.clone(),
            local: installed.clone(),
        },
    };
    (classification, resolution.warning)
}

/// Classification of a whole requirement list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    /// One entry per requirement, in input order.
    pub classifications: Vec<Classification>,
    /// Relaxed-toolchain resolutions.
    pub warnings: Vec<ResolutionWarning>,
}

impl DiffReport {
    /// Requirements with no remote artifact.
    pub fn unresolved(&self) -> Vec<(&PackageRequirement, UnresolvedReason)> {
        self.classifications
            .iter()
            .filter_map(|c| match c {
                Classification::Unresolved {
                    requirement,
                    reason,
                } => Some((requirement, *reason)),
                _ => None,
            })
            .collect()
    }

    /// Remote artifacts that are not installed.
    pub fn missing(&self) -> Vec<&ArtifactRecord> {
        self.classifications
            .iter()
            .filter_map(|c| match c {
                Classification::Missing { remote, .. } => Some(remote),
                _ => None,
            })
            .collect()
    }

    /// Remote artifacts newer than their installed copy.
    pub fn stale(&self) -> Vec<&ArtifactRecord> {
        self.classifications
            .iter()
            .filter_map(|c| match c {
                Classification::Stale { remote, .. } => Some(remote),
                _ => None,
            })
            .collect()
    }

    /// Installed artifacts that are current.
    pub fn satisfied(&self) -> Vec<&ArtifactRecord> {
        self.classifications
            .iter()
            .filter_map(|c| match c {
                Classification::Satisfied { local, .. } => Some(local),
                _ => None,
            })
            .collect()
    }

    /// Artifacts to download: missing first, then stale, each identity once.
    pub fn fetch_plan(&self) -> Vec<ArtifactRecord> {
        let mut seen = HashSet::new();
        self.missing()
            .into_iter()
            .chain(self.stale())
            .filter(|r| seen.insert(r.identity.clone()))
            .cloned()
            .collect()
    }

    /// Whether nothing needs to be fetched and nothing is unresolved.
    pub fn is_up_to_date(&self) -> bool {
        self.classifications
            .iter()
            .all(|c| matches!(c, Classification::Satisfied { .. }))
    }
}

/// Classify every requirement.
pub fn diff(
    requirements: &[PackageRequirement],
    remote: &RemoteIndex,
    local: &LocalIndex,
    target: &ToolchainTag,
) -> DiffReport {
    let mut report = DiffReport::default();
    for requirement in requirements {
        let (classification, warning) = classify(requirement, remote, local, target);
        report.classifications.push(classification);
        report.warnings.extend(warning);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::decode_remote_path;
    use crate::manifest::parse_requirement;
    use crate::testing::ts;
    use lean_schema::Channel;

    fn req(text: &str) -> PackageRequirement {
        parse_requirement(text).unwrap()
    }

    fn tc(tag: &str) -> ToolchainTag {
        ToolchainTag::new(tag).unwrap()
    }

    fn remote(entries: &[(&str, i64)]) -> RemoteIndex {
        RemoteIndex::from_records(entries.iter().map(|(path, secs)| {
            let (name, version, toolchain, channel) = decode_remote_path(path).unwrap();
            ArtifactRecord::new(name, version, toolchain, Some(channel), *path, ts(*secs)).unwrap()
        }))
    }

    fn installed(remote: &RemoteIndex, id: &str, secs: i64) -> ArtifactRecord {
        let record = remote
            .names()
            .flat_map(|n| remote.versions(n))
            .find(|r| r.identity.to_string() == id)
            .unwrap()
            .clone();
        ArtifactRecord {
            channel: None,
            origin: format!("/cache/{id}"),
            timestamp: ts(secs),
            ..record
        }
    }

    #[test]
    fn test_pinned_version_falls_back_to_other_toolchain() {
        let remote = remote(&[("u/VS2019/libfoo/stable/libfoo@2.1.0.zip", 10)]);
        let resolution = resolve_one(&req("libfoo==2.1.0"), &remote, &tc("GCC12.3.0")).unwrap();

        assert_eq!(resolution.record.identity.to_string(), "libfoo@2.1.0@VS2019");
        assert_eq!(
            resolution.warning,
            Some(ResolutionWarning::ToolchainMismatch {
                requirement: req("libfoo==2.1.0"),
                target: tc("GCC12.3.0"),
                used: tc("VS2019"),
            })
        );
    }

    #[test]
    fn test_pinned_version_prefers_target_toolchain() {
        let remote = remote(&[
            ("u/VS2019/libfoo/stable/libfoo@2.1.0.zip", 10),
            ("u/GCC12.3.0/libfoo/common/libfoo@2.1.0.zip", 10),
        ]);
        let resolution = resolve_one(&req("libfoo==2.1.0"), &remote, &tc("GCC12.3.0")).unwrap();
        assert_eq!(resolution.record.toolchain().as_str(), "GCC12.3.0");
        assert!(resolution.warning.is_none());
    }

    #[test]
    fn test_stable_outranks_higher_common() {
        let remote = remote(&[
            ("u/GCC12.3.0/libbar/common/libbar@1.0.0.zip", 10),
            ("u/GCC12.3.0/libbar/stable/libbar@0.9.0.zip", 10),
        ]);
        let resolution = resolve_one(&req("libbar"), &remote, &tc("GCC12.3.0")).unwrap();
        assert_eq!(resolution.record.version.as_str(), "0.9.0");
        assert_eq!(resolution.record.channel, Some(Channel::Stable));
    }

    #[test]
    fn test_common_used_when_no_stable() {
        let remote = remote(&[
            ("u/GCC12.3.0/libbar/common/libbar@1.0.0.zip", 10),
            ("u/GCC12.3.0/libbar/common/libbar@1.2.0.zip", 10),
        ]);
        let resolution = resolve_one(&req("libbar"), &remote, &tc("GCC12.3.0")).unwrap();
        assert_eq!(resolution.record.version.as_str(), "1.2.0");
    }

    #[test]
    fn test_unpinned_searches_all_toolchains_with_warning() {
        let remote = remote(&[
            ("u/VS2019/zlib/stable/zlib@1.2.zip", 10),
            ("u/VS2022/zlib/stable/zlib@1.3.zip", 10),
        ]);
        let resolution = resolve_one(&req("zlib"), &remote, &tc("GCC12.3.0")).unwrap();
        assert_eq!(resolution.record.identity.to_string(), "zlib@1.3@VS2022");
        assert!(matches!(
            resolution.warning,
            Some(ResolutionWarning::NoTargetToolchain { .. })
        ));
    }

    #[test]
    fn test_unresolved_reasons() {
        let remote = remote(&[("u/VS2019/zlib/stable/zlib@1.2.zip", 10)]);
        assert_eq!(
            resolve_one(&req("curl"), &remote, &tc("VS2019")),
            Err(UnresolvedReason::NotOnRemote)
        );
        assert_eq!(
            resolve_one(&req("zlib==9.9"), &remote, &tc("VS2019")),
            Err(UnresolvedReason::NoMatchingVersion)
        );
    }

    #[test]
    fn test_newer_remote_timestamp_is_stale() {
        let remote = remote(&[("u/GCC12.3.0/libbaz/stable/libbaz@1.0.0.tar.gz", 200)]);
        let local = LocalIndex::from_records([installed(&remote, "libbaz@1.0.0@GCC12.3.0", 100)]);

        let report = diff(&[req("libbaz")], &remote, &local, &tc("GCC12.3.0"));
        assert_eq!(report.stale().len(), 1);
        assert_eq!(report.fetch_plan()[0].identity.to_string(), "libbaz@1.0.0@GCC12.3.0");
        assert!(!report.is_up_to_date());
    }

    #[test]
    fn test_equal_or_older_remote_is_satisfied() {
        let remote = remote(&[("u/GCC12.3.0/libbaz/stable/libbaz@1.0.0.tar.gz", 100)]);
        let local = LocalIndex::from_records([installed(&remote, "libbaz@1.0.0@GCC12.3.0", 100)]);

        let report = diff(&[req("libbaz")], &remote, &local, &tc("GCC12.3.0"));
        assert_eq!(report.satisfied().len(), 1);
        assert!(report.fetch_plan().is_empty());
        assert!(report.is_up_to_date());
    }

    #[test]
    fn test_fetch_plan_dedups_and_orders_missing_before_stale() {
        let remote = remote(&[
            ("u/VS2019/zlib/stable/zlib@1.3.zip", 50),
            ("u/VS2019/curl/stable/curl@8.0.zip", 50),
            ("u/VS2019/boost/stable/boost@1.82.zip", 50),
        ]);
        let local = LocalIndex::from_records([
            installed(&remote, "zlib@1.3@VS2019", 10),
            installed(&remote, "boost@1.82@VS2019", 90),
        ]);
        let requirements = [req("zlib"), req("curl"), req("zlib==1.3"), req("boost"), req("ghost")];

        let report = diff(&requirements, &remote, &local, &tc("VS2019"));
        let plan: Vec<String> = report
            .fetch_plan()
            .iter()
            .map(|r| r.identity.to_string())
            .collect();
        assert_eq!(plan, vec!["curl@8.0@VS2019", "zlib@1.3@VS2019"]);
        assert_eq!(report.unresolved().len(), 1);
        assert_eq!(report.satisfied().len(), 1);
        assert_eq!(report.classifications.len(), 5);
    }
}
