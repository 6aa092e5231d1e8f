//! Declared requirements and their placement directives.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::PackageName;
use crate::version::Version;

/// A package a project needs, optionally pinned to one version.
///
/// Equality is by `(name, version)`; a requirement without a version means
/// "latest available".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageRequirement {
    /// Required package.
    pub name: PackageName,
    /// Pinned version, if any.
    pub version: Option<Version>,
}

impl PackageRequirement {
    /// Create a requirement.
    pub fn new(name: PackageName, version: Option<Version>) -> Self {
        Self { name, version }
    }

    /// An unpinned requirement.
    pub fn latest(name: PackageName) -> Self {
        Self {
            name,
            version: None,
        }
    }
}

impl fmt::Display for PackageRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}=={v}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// File operation performed by a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveCommand {
    /// Copy matches, leaving the artifact intact.
    Copy,
    /// Move matches out of the artifact.
    Move,
}

impl DirectiveCommand {
    /// Parse `copy` / `move`, case-insensitive.
    pub fn parse(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("copy") {
            Some(Self::Copy)
        } else if word.eq_ignore_ascii_case("move") {
            Some(Self::Move)
        } else {
            None
        }
    }

    /// Lower-case keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
        }
    }
}

/// A post-install placement instruction: `copy <glob> to <dest>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyDirective {
    /// Copy or move.
    pub command: DirectiveCommand,
    /// Glob relative to the owning artifact's root.
    pub source_glob: String,
    /// Destination relative to the project root.
    pub destination: String,
}

impl fmt::Display for DependencyDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} to {}",
            self.command.as_str(),
            self.source_glob,
            self.destination
        )
    }
}
