//! Remote OS directory selection.
//!
//! The remote root holds one directory per OS build target, named
//! `<os-name>-<os-version>` (`ubuntu-20.04`, `windows-10`, `linuxmint-21.0`).
//! [`find_best_os_dir`] picks the one whose artifacts are most likely to run on
//! the local host.

use lean_schema::Version;
use thiserror::Error;

use crate::platform::HostOs;

/// Markers that make a remote directory a candidate for any Linux host.
const LINUX_FALLBACK_MARKERS: [&str; 2] = ["linux", "mint"];

/// Why no remote OS directory could be chosen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    /// No directory matches the OS name, even after the Linux fallback.
    #[error("No remote directory matches the local system '{local}'")]
    NoRemoteMatch {
        /// The local `name-version` that was searched for.
        local: String,
    },

    /// The host OS version is not dotted numeric.
    #[error("The local system version '{0}' could not be parsed")]
    InvalidLocalVersion(String),
}

/// How the chosen directory relates to the local OS version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchConfidence {
    /// Same OS version.
    Exact,
    /// Closest older version; assumed backward compatible.
    OlderCompatible,
    /// Closest newer version; compatibility is not guaranteed.
    NewerFallback,
}

/// Outcome of [`find_best_os_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsMatch {
    /// Remote directory name.
    pub dir: String,
    /// Version relation to the host.
    pub confidence: MatchConfidence,
    /// True when the directory came from the generic Linux fallback set.
    pub linux_fallback: bool,
}

struct Candidate<'a> {
    dir: &'a str,
    version: Version,
}

/// Choose the remote OS directory for `local` among `candidates`.
///
/// Name matches (substring either way, case-insensitive) take priority. Only
/// when there are none and the host is Linux-family are directories carrying a
/// generic Linux marker considered. Within the chosen set an exact version wins,
/// then the greatest older version, then the smallest newer one.
///
/// # Errors
///
/// [`LocateError::InvalidLocalVersion`] if the host version does not parse, and
/// [`LocateError::NoRemoteMatch`] if no candidate qualifies.
pub fn find_best_os_dir<S: AsRef<str>>(
    candidates: &[S],
    local: &HostOs,
) -> Result<OsMatch, LocateError> {
    let local_version = Version::parse(&local.version)
        .map_err(|_| LocateError::InvalidLocalVersion(local.version.clone()))?;
    let local_name = local.name.to_lowercase();

    let mut matched = Vec::new();
    let mut fallback = Vec::new();

    for dir in candidates.iter().map(AsRef::as_ref) {
        let Some((os_name, os_version)) = dir.rsplit_once('-') else {
            continue;
        };
        let Ok(version) = Version::parse(os_version) else {
            continue;
        };
        let os_name = os_name.to_lowercase();

        if os_name.contains(&local_name) || local_name.contains(&os_name) {
            matched.push(Candidate { dir, version });
        } else if local.is_linux_family()
            && LINUX_FALLBACK_MARKERS.iter().any(|m| os_name.contains(m))
        {
            fallback.push(Candidate { dir, version });
        }
    }

    let (pool, linux_fallback) = if !matched.is_empty() {
        (matched, false)
    } else if !fallback.is_empty() {
        (fallback, true)
    } else {
        return Err(LocateError::NoRemoteMatch {
            local: local.to_string(),
        });
    };

    if let Some(exact) = pool.iter().find(|c| c.version == local_version) {
        return Ok(OsMatch {
            dir: exact.dir.to_string(),
            confidence: MatchConfidence::Exact,
            linux_fallback,
        });
    }

    // Ties keep the first candidate in input order.
    let mut older: Option<&Candidate<'_>> = None;
    let mut newer: Option<&Candidate<'_>> = None;
    for candidate in &pool {
        if candidate.version < local_version {
            if older.is_none_or(|best| candidate.version > best.version) {
                older = Some(candidate);
            }
        } else if newer.is_none_or(|best| candidate.version < best.version) {
            newer = Some(candidate);
        }
    }

    let (chosen, confidence) = match (older, newer) {
        (Some(c), _) => (c, MatchConfidence::OlderCompatible),
        (None, Some(c)) => (c, MatchConfidence::NewerFallback),
        (None, None) => {
            return Err(LocateError::NoRemoteMatch {
                local: local.to_string(),
            });
        }
    };

    Ok(OsMatch {
        dir: chosen.dir.to_string(),
        confidence,
        linux_fallback,
    })
}
