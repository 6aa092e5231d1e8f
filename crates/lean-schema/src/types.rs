//! Package names and toolchain tags.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::identity::IdentityError;

/// Separator used by canonical identities (`name@version@toolchain`).
pub const KEY_SEPARATOR: char = '@';

/// A lean package name as it appears on the remote and in manifests.
///
/// Names are case-sensitive and may not contain [`KEY_SEPARATOR`] or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    /// Validate and wrap a package name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Empty`] for blank input and
    /// [`IdentityError::Separator`] / [`IdentityError::Whitespace`] for names that
    /// cannot be used inside an identity key.
    pub fn new(name: &str) -> Result<Self, IdentityError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IdentityError::Empty("name"));
        }
        if name.contains(KEY_SEPARATOR) {
            return Err(IdentityError::Separator(name.to_string()));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(IdentityError::Whitespace(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// Return the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl TryFrom<String> for PackageName {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl TryFrom<&str> for PackageName {
    type Error = IdentityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PackageName> for String {
    fn from(value: PackageName) -> Self {
        value.0
    }
}

/// Compiler/ABI tag an artifact was built with, e.g. `VS2019` or `GCC12.3.0`.
///
/// Tags are stored upper-cased so equality is case-insensitive. There is no
/// ordering between toolchains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolchainTag(String);

impl ToolchainTag {
    /// Tag assigned to local cache entries without a recognizable suffix.
    pub const UNKNOWN: &'static str = "UNKNOWN";

    /// Normalize and wrap a toolchain tag.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] for empty tags or tags containing the key separator.
    pub fn new(tag: &str) -> Result<Self, IdentityError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(IdentityError::Empty("toolchain"));
        }
        if tag.contains(KEY_SEPARATOR) {
            return Err(IdentityError::Separator(tag.to_string()));
        }
        Ok(Self(tag.to_ascii_uppercase()))
    }

    /// The placeholder tag for entries whose toolchain could not be decoded.
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    /// Whether this is the placeholder tag.
    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    /// Return the normalized tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolchainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ToolchainTag {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ToolchainTag> for String {
    fn from(value: ToolchainTag) -> Self {
        value.0
    }
}

impl std::str::FromStr for ToolchainTag {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Remote maturity bucket of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Released artifacts; always preferred.
    Stable,
    /// Shared or in-progress artifacts; used when no stable build exists.
    Common,
}

impl Channel {
    /// Decode a remote path segment. Only `stable` and `common` are indexed.
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "stable" => Some(Self::Stable),
            "common" => Some(Self::Common),
            _ => None,
        }
    }

    /// Convert to the path segment representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Common => "common",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Archive container of a remote artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFormat {
    /// Zip archive (`.zip`).
    #[serde(rename = "zip")]
    Zip,
    /// Uncompressed tar archive (`.tar`).
    #[serde(rename = "tar")]
    Tar,
    /// Gzip-compressed tar archive (`.tar.gz` / `.tgz`).
    #[serde(rename = "tar.gz")]
    TarGz,
    /// Zstandard-compressed tar archive (`.tar.zst` / `.tzst`).
    #[serde(rename = "tar.zst")]
    TarZst,
}

impl ArchiveFormat {
    // Longest suffix first so `.tar.gz` is not read as `.gz`.
    const SUFFIXES: [(&'static str, Self); 6] = [
        (".tar.zst", Self::TarZst),
        (".tar.gz", Self::TarGz),
        (".tzst", Self::TarZst),
        (".tgz", Self::TarGz),
        (".tar", Self::Tar),
        (".zip", Self::Zip),
    ];

    /// Detect the format from a file name (case-insensitive).
    pub fn detect(file_name: &str) -> Option<Self> {
        Self::split(file_name).map(|(_, format)| format)
    }

    /// Split a file name into its stem and archive format.
    ///
    /// ```
    /// use lean_schema::ArchiveFormat;
    ///
    /// assert_eq!(
    ///     ArchiveFormat::split("zlib@1.3.tar.gz"),
    ///     Some(("zlib@1.3", ArchiveFormat::TarGz))
    /// );
    /// assert_eq!(ArchiveFormat::split("README.md"), None);
    /// ```
    pub fn split(file_name: &str) -> Option<(&str, Self)> {
        let lower = file_name.to_ascii_lowercase();
        Self::SUFFIXES.iter().find_map(|(suffix, format)| {
            lower
                .ends_with(suffix)
                .then(|| (&file_name[..file_name.len() - suffix.len()], *format))
        })
    }
}
