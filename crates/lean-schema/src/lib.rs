//! Shared data model for lean packages.
//!
//! Everything here is pure: versions, names, toolchain tags, artifact
//! identities and the records produced by the local and remote indices.

pub mod identity;
pub mod requirement;
pub mod types;
pub mod version;

pub use identity::{ArtifactIdentity, ArtifactRecord, IdentityError};
pub use requirement::{DependencyDirective, DirectiveCommand, PackageRequirement};
pub use types::*;
pub use version::{Version, VersionError};
