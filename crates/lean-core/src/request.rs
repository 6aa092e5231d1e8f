//! What a command asked to resolve.
//!
//! Command-line flags are folded once into a [`ResolutionRequest`], which is
//! then turned into a [`ResolutionPlan`]: the project root, the root manifest
//! files to read and the toolchain override.

use std::path::{Path, PathBuf};

use lean_schema::{PackageRequirement, ToolchainTag};
use thiserror::Error;
use tracing::debug;

use crate::graph::MANIFEST_EXT;
use crate::manifest::{self, RequirementParseError};
use crate::reporter::Reporter;
use crate::session::{SyncError, SyncSession};

/// Manifest written by `--spec` when no object or manifest is named.
pub const DEFAULT_OBJECT: &str = "default";

/// Failures turning a request into a [`ResolutionPlan`].
#[derive(Error, Debug)]
pub enum RequestError {
    /// A named manifest file is absent.
    #[error("Manifest {0} does not exist")]
    MissingManifest(String),

    /// A compiler scan found nothing to resolve.
    #[error("No manifest in {root} is tagged [{toolchain}]")]
    NoTaggedManifest {
        /// Directory that was scanned.
        root: String,
        /// Tag that was looked for.
        toolchain: ToolchainTag,
    },

    /// `--compiler` is not a valid toolchain tag.
    #[error("Invalid toolchain '{0}'")]
    InvalidToolchain(String),

    /// A `--spec` argument is malformed.
    #[error(transparent)]
    InvalidSpec(#[from] RequirementParseError),

    /// `--spec` names packages the remote does not carry.
    #[error("Package(s) not found on the remote: {}", .0.join(", "))]
    UnknownPackages(Vec<String>),

    /// Checking packages against the remote failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Reading or writing a manifest failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw selection flags shared by the resolving commands.
#[derive(Debug, Clone, Default)]
pub struct RequestFlags {
    /// `--manifest`
    pub manifest: Option<String>,
    /// `--obj-name`
    pub objects: Vec<String>,
    /// `--spec`
    pub spec: Vec<String>,
    /// `--compiler`
    pub compiler: Option<String>,
}

/// One way of choosing the manifests to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionRequest {
    /// An explicit manifest file.
    ByManifestFile {
        /// File name relative to the project root.
        manifest: String,
        /// Overrides the manifest's own tag.
        toolchain: Option<ToolchainTag>,
    },
    /// `<object>.manifest` for each object; with a toolchain, objects without
    /// a manifest fall back to a compiler scan.
    ByObjectName {
        /// Object names without extension.
        objects: Vec<String>,
        /// Overrides the manifests' own tags.
        toolchain: Option<ToolchainTag>,
    },
    /// Every root manifest tagged with `toolchain`.
    ByCompilerScan {
        /// Tag to look for.
        toolchain: ToolchainTag,
    },
    /// Append packages to `manifest`, then resolve it.
    BySpec {
        /// Requirements to append.
        packages: Vec<PackageRequirement>,
        /// Manifest receiving them.
        manifest: String,
    },
}

fn manifest_file(object: &str) -> String {
    format!("{object}.{MANIFEST_EXT}")
}

fn object_of(manifest: &str) -> String {
    Path::new(manifest)
        .file_stem()
        .map_or_else(|| manifest.to_string(), |s| s.to_string_lossy().to_string())
}

fn parse_toolchain(text: &str) -> Result<ToolchainTag, RequestError> {
    ToolchainTag::new(text).map_err(|_| RequestError::InvalidToolchain(text.to_string()))
}

impl ResolutionRequest {
    /// Fold command-line flags into a request.
    ///
    /// `--spec` wins over everything and ignores `--compiler`; then an explicit
    /// manifest; then object names; then a compiler scan. With no flags at all
    /// the root is scanned for manifests tagged `detected`.
    ///
    /// # Errors
    ///
    /// [`RequestError::InvalidSpec`] or [`RequestError::InvalidToolchain`] for
    /// malformed arguments.
    pub fn from_flags(
        flags: RequestFlags,
        detected: &ToolchainTag,
        reporter: &dyn Reporter,
    ) -> Result<Self, RequestError> {
        let toolchain = flags.compiler.as_deref().map(parse_toolchain).transpose()?;

        if !flags.spec.is_empty() {
            if toolchain.is_some() {
                reporter.warning("--compiler is ignored together with --spec");
            }
            let packages = flags
                .spec
                .iter()
                .map(|s| manifest::parse_requirement(s))
                .collect::<Result<Vec<_>, _>>()?;
            let manifest = flags.manifest.unwrap_or_else(|| {
                manifest_file(flags.objects.first().map_or(DEFAULT_OBJECT, String::as_str))
            });
            return Ok(Self::BySpec { packages, manifest });
        }

        if let Some(manifest) = flags.manifest {
            return Ok(Self::ByManifestFile {
                manifest,
                toolchain,
            });
        }

        if !flags.objects.is_empty() {
            return Ok(Self::ByObjectName {
                objects: flags.objects,
                toolchain,
            });
        }

        let toolchain = toolchain.unwrap_or_else(|| {
            reporter.info(&format!("No selection given; using toolchain {detected}"));
            detected.clone()
        });
        Ok(Self::ByCompilerScan { toolchain })
    }

    /// Turn the request into a plan for the project at `root`.
    ///
    /// `BySpec` checks every package name against the remote index and edits
    /// the target manifest before planning it.
    ///
    /// # Errors
    ///
    /// Missing manifests, an empty compiler scan, unknown spec packages and
    /// remote failures.
    pub async fn plan(
        self,
        root: &Path,
        session: &mut SyncSession,
        reporter: &dyn Reporter,
    ) -> Result<ResolutionPlan, RequestError> {
        let plan = match self {
            Self::ByManifestFile {
                manifest,
                toolchain,
            } => {
                if !root.join(&manifest).is_file() {
                    return Err(RequestError::MissingManifest(manifest));
                }
                ResolutionPlan::new(root, vec![manifest], toolchain)
            }
            Self::ByObjectName { objects, toolchain } => {
                let manifests: Vec<String> = objects.iter().map(|o| manifest_file(o)).collect();
                let missing = manifests.iter().find(|m| !root.join(m).is_file()).cloned();
                match (missing, toolchain) {
                    (None, toolchain) => ResolutionPlan::new(root, manifests, toolchain),
                    (Some(_), Some(toolchain)) => scan_tagged(root, toolchain, reporter)?,
                    (Some(missing), None) => {
                        return Err(RequestError::MissingManifest(missing));
                    }
                }
            }
            Self::ByCompilerScan { toolchain } => scan_tagged(root, toolchain, reporter)?,
            Self::BySpec { packages, manifest } => {
                let remote = session.remote_index(reporter).await?;
                let unknown: Vec<String> = packages
                    .iter()
                    .filter(|p| !remote.contains_name(&p.name))
                    .map(|p| p.name.to_string())
                    .collect();
                if !unknown.is_empty() {
                    return Err(RequestError::UnknownPackages(unknown));
                }

                let path = root.join(&manifest);
                let tag = manifest::read_toolchain_tag(&path)
                    .unwrap_or_else(|| session.default_toolchain().clone());
                let edit = manifest::append_requirements(&path, &packages, &tag)?;
                for requirement in &edit.added {
                    reporter.info(&format!("Added {requirement} to {manifest}"));
                }
                for requirement in &edit.already_present {
                    reporter.info(&format!("{} already declared in {manifest}", requirement.name));
                }
                ResolutionPlan::new(root, vec![manifest], None)
            }
        };
        debug!("Resolution plan: {:?}", plan.manifests);
        Ok(plan)
    }
}

fn scan_tagged(
    root: &Path,
    toolchain: ToolchainTag,
    reporter: &dyn Reporter,
) -> Result<ResolutionPlan, RequestError> {
    let mut manifests = Vec::new();
    for entry in std::fs::read_dir(root)?.filter_map(Result::ok) {
        let path = entry.path();
        let is_manifest = path.is_file() && path.extension().is_some_and(|e| e == MANIFEST_EXT);
        if is_manifest && manifest::read_toolchain_tag(&path).as_ref() == Some(&toolchain) {
            manifests.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    if manifests.is_empty() {
        return Err(RequestError::NoTaggedManifest {
            root: root.display().to_string(),
            toolchain,
        });
    }
    manifests.sort();
    reporter.info(&format!(
        "Found {} manifest(s) tagged [{toolchain}]: {}",
        manifests.len(),
        manifests.join(", ")
    ));
    Ok(ResolutionPlan::new(root, manifests, Some(toolchain)))
}

/// Root manifests to read and how to pick the target toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPlan {
    /// Directory holding the root manifests.
    pub project_root: PathBuf,
    /// File names relative to `project_root`.
    pub manifests: Vec<String>,
    /// Toolchain that overrides manifest tags.
    pub toolchain_override: Option<ToolchainTag>,
    /// Object names, one per manifest.
    pub objects: Vec<String>,
}

impl ResolutionPlan {
    /// Plan for `manifests` under `root`, deriving object names from the file names.
    pub fn new(root: &Path, manifests: Vec<String>, toolchain_override: Option<ToolchainTag>) -> Self {
        let objects = manifests.iter().map(|m| object_of(m)).collect();
        Self {
            project_root: root.to_path_buf(),
            manifests,
            toolchain_override,
            objects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::HostOs;
    use crate::reporter::NullReporter;
    use crate::testing::{MemoryRepository, RecordingReporter, ts};
    use tempfile::TempDir;

    fn gcc() -> ToolchainTag {
        ToolchainTag::new("GCC12.3.0").unwrap()
    }

    fn flags() -> RequestFlags {
        RequestFlags::default()
    }

    fn session(cache: &Path) -> SyncSession {
        let repo = MemoryRepository::new()
            .with_file("ubuntu-22.04/GCC12.3.0/zlib/stable/zlib@1.3.tar.gz", "x", ts(1));
        SyncSession::new(
            Box::new(repo),
            cache.to_path_buf(),
            HostOs::new("ubuntu", "22.04"),
            gcc(),
        )
    }

    #[test]
    fn test_spec_wins_and_ignores_compiler() {
        let reporter = RecordingReporter::default();
        let request = ResolutionRequest::from_flags(
            RequestFlags {
                manifest: Some("app.manifest".into()),
                spec: vec!["zlib==1.3".into()],
                compiler: Some("vs2019".into()),
                ..flags()
            },
            &gcc(),
            &reporter,
        )
        .unwrap();

        assert!(matches!(
            request,
            ResolutionRequest::BySpec { ref manifest, ref packages }
                if manifest == "app.manifest" && packages.len() == 1
        ));
        assert_eq!(reporter.warnings().len(), 1);
    }

    #[test]
    fn test_spec_manifest_defaults() {
        let by_object = ResolutionRequest::from_flags(
            RequestFlags {
                objects: vec!["tool".into()],
                spec: vec!["zlib".into()],
                ..flags()
            },
            &gcc(),
            &NullReporter,
        )
        .unwrap();
        let bare = ResolutionRequest::from_flags(
            RequestFlags {
                spec: vec!["zlib".into()],
                ..flags()
            },
            &gcc(),
            &NullReporter,
        )
        .unwrap();

        assert!(matches!(by_object, ResolutionRequest::BySpec { manifest, .. } if manifest == "tool.manifest"));
        assert!(matches!(bare, ResolutionRequest::BySpec { manifest, .. } if manifest == "default.manifest"));
    }

    #[test]
    fn test_no_flags_scans_detected_toolchain() {
        let request = ResolutionRequest::from_flags(flags(), &gcc(), &NullReporter).unwrap();
        assert_eq!(request, ResolutionRequest::ByCompilerScan { toolchain: gcc() });
    }

    #[test]
    fn test_invalid_spec_is_rejected() {
        let err = ResolutionRequest::from_flags(
            RequestFlags {
                spec: vec!["zlib==not.a.version!".into()],
                ..flags()
            },
            &gcc(),
            &NullReporter,
        )
        .unwrap_err();
        assert!(matches!(err, RequestError::InvalidSpec(_)));
    }

    #[tokio::test]
    async fn test_object_name_maps_to_manifest() {
        let project = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        std::fs::write(project.path().join("tool.manifest"), "zlib\n").unwrap();
        let mut session = session(cache.path());

        let plan = ResolutionRequest::ByObjectName {
            objects: vec!["tool".into()],
            toolchain: None,
        }
        .plan(project.path(), &mut session, &NullReporter)
        .await
        .unwrap();

        assert_eq!(plan.manifests, vec!["tool.manifest".to_string()]);
        assert_eq!(plan.objects, vec!["tool".to_string()]);
        assert_eq!(plan.toolchain_override, None);
    }

    #[tokio::test]
    async fn test_missing_object_manifest_without_compiler_fails() {
        let project = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let mut session = session(cache.path());

        let err = ResolutionRequest::ByObjectName {
            objects: vec!["tool".into()],
            toolchain: None,
        }
        .plan(project.path(), &mut session, &NullReporter)
        .await
        .unwrap_err();
        assert!(matches!(err, RequestError::MissingManifest(m) if m == "tool.manifest"));
    }

    #[tokio::test]
    async fn test_compiler_scan_selects_tagged_root_manifests() {
        let project = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        std::fs::write(project.path().join("b.manifest"), "[gcc12.3.0]\nzlib\n").unwrap();
        std::fs::write(project.path().join("a.manifest"), "[GCC12.3.0]\ncurl\n").unwrap();
        std::fs::write(project.path().join("w.manifest"), "[VS2019]\nzlib\n").unwrap();
        std::fs::write(project.path().join("plain.manifest"), "zlib\n").unwrap();
        let mut session = session(cache.path());

        let plan = ResolutionRequest::ByCompilerScan { toolchain: gcc() }
            .plan(project.path(), &mut session, &NullReporter)
            .await
            .unwrap();

        assert_eq!(plan.manifests, vec!["a.manifest".to_string(), "b.manifest".to_string()]);
        assert_eq!(plan.objects, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(plan.toolchain_override, Some(gcc()));

        let err = ResolutionRequest::ByCompilerScan {
            toolchain: ToolchainTag::new("VS2022").unwrap(),
        }
        .plan(project.path(), &mut session, &NullReporter)
        .await
        .unwrap_err();
        assert!(matches!(err, RequestError::NoTaggedManifest { .. }));
    }

    #[tokio::test]
    async fn test_spec_appends_known_packages() {
        let project = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let mut session = session(cache.path());

        let plan = ResolutionRequest::BySpec {
            packages: vec![manifest::parse_requirement("zlib==1.3").unwrap()],
            manifest: "default.manifest".into(),
        }
        .plan(project.path(), &mut session, &NullReporter)
        .await
        .unwrap();

        assert_eq!(plan.manifests, vec!["default.manifest".to_string()]);
        let written = std::fs::read_to_string(project.path().join("default.manifest")).unwrap();
        assert_eq!(written, "[GCC12.3.0]\nzlib==1.3\n");
    }

    #[tokio::test]
    async fn test_spec_rejects_unknown_packages() {
        let project = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let mut session = session(cache.path());

        let err = ResolutionRequest::BySpec {
            packages: vec![manifest::parse_requirement("nope").unwrap()],
            manifest: "default.manifest".into(),
        }
        .plan(project.path(), &mut session, &NullReporter)
        .await
        .unwrap_err();

        assert!(matches!(err, RequestError::UnknownPackages(names) if names == vec!["nope".to_string()]));
        assert!(!project.path().join("default.manifest").exists());
    }
}
