//! Canonical artifact identity and index records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Channel, KEY_SEPARATOR, PackageName, ToolchainTag};
use crate::version::Version;

/// Errors raised while building identity components.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// A required component is blank.
    #[error("Empty {0} in artifact identity")]
    Empty(&'static str),

    /// A component contains the `@` key separator.
    #[error("'{0}' contains the reserved '@' separator")]
    Separator(String),

    /// A package name contains whitespace.
    #[error("'{0}' contains whitespace")]
    Whitespace(String),
}

/// The `name@version@toolchain` key that identifies one artifact.
///
/// The version component keeps its original text so that keys built from the
/// local cache and from the remote agree byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactIdentity {
    name: PackageName,
    version: String,
    toolchain: ToolchainTag,
}

impl ArtifactIdentity {
    /// Build an identity from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] if the version text is empty or contains `@`.
    pub fn new(
        name: PackageName,
        version: &str,
        toolchain: ToolchainTag,
    ) -> Result<Self, IdentityError> {
        let version = version.trim();
        if version.is_empty() {
            return Err(IdentityError::Empty("version"));
        }
        if version.contains(KEY_SEPARATOR) {
            return Err(IdentityError::Separator(version.to_string()));
        }
        Ok(Self {
            name,
            version: version.to_string(),
            toolchain,
        })
    }

    /// Package name component.
    pub fn name(&self) -> &PackageName {
        &self.name
    }

    /// Version text component.
    pub fn version_str(&self) -> &str {
        &self.version
    }

    /// Toolchain component.
    pub fn toolchain(&self) -> &ToolchainTag {
        &self.toolchain
    }

    /// Directory name an installed artifact occupies in the cache.
    pub fn dir_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            self.name, self.version, self.toolchain
        )
    }
}

/// One entry of a local or remote artifact index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Canonical key.
    pub identity: ArtifactIdentity,
    /// Parsed version, used for ordering.
    pub version: Version,
    /// Remote channel. Local records have none.
    pub channel: Option<Channel>,
    /// Remote path of the archive, or the local directory path.
    pub origin: String,
    /// Modification time of the archive or directory.
    pub timestamp: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Build a record, deriving the identity from `name`, `version` and `toolchain`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] if the version text cannot be used in a key.
    pub fn new(
        name: PackageName,
        version: Version,
        toolchain: ToolchainTag,
        channel: Option<Channel>,
        origin: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, IdentityError> {
        let identity = ArtifactIdentity::new(name, version.as_str(), toolchain)?;
        Ok(Self {
            identity,
            version,
            channel,
            origin: origin.into(),
            timestamp,
        })
    }

    /// Package name.
    pub fn name(&self) -> &PackageName {
        self.identity.name()
    }

    /// Toolchain the artifact was built with.
    pub fn toolchain(&self) -> &ToolchainTag {
        self.identity.toolchain()
    }

    /// Whether this record sits in the `stable` channel.
    pub fn is_stable(&self) -> bool {
        self.channel == Some(Channel::Stable)
    }

    /// File name component of `origin`.
    pub fn file_name(&self) -> &str {
        self.origin
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.origin)
    }
}
