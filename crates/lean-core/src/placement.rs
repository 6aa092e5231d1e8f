//! Post-install placement of artifact files into the project tree.
//!
//! Directives such as `copy bin/*.dll to ./` are resolved against the installed
//! artifact that owns them and applied relative to the project root.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use lean_schema::{ArtifactRecord, DependencyDirective, DirectiveCommand, PackageRequirement, ToolchainTag};
use tracing::{debug, info};

use crate::index::LocalIndex;

/// A directive that could not be carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementWarning {
    /// The glob matched nothing inside the owning artifact.
    NoMatch {
        /// Requirement that declared the directive.
        owner: PackageRequirement,
        /// The unmatched source glob.
        pattern: String,
    },
    /// No installed artifact satisfies the owning requirement.
    OwnerMissing {
        /// Requirement that declared the directives.
        owner: PackageRequirement,
    },
    /// A matched item could not be copied or moved.
    Failed {
        /// Requirement that declared the directive.
        owner: PackageRequirement,
        /// Source item inside the owner's cache directory.
        item: PathBuf,
        /// Rendered IO error.
        reason: String,
    },
}

impl fmt::Display for PlacementWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch { owner, pattern } => {
                write!(f, "'{owner}': no items matching '{pattern}'")
            }
            Self::OwnerMissing { owner } => {
                write!(f, "'{owner}' is not installed locally, directives skipped")
            }
            Self::Failed {
                owner,
                item,
                reason,
            } => write!(f, "'{owner}': cannot place {}: {reason}", item.display()),
        }
    }
}

/// One item copied or moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedItem {
    /// Requirement whose descriptor declared the directive.
    pub owner: PackageRequirement,
    /// Copy or move.
    pub command: DirectiveCommand,
    /// Path inside the owner's cache directory.
    pub source: PathBuf,
    /// Where it landed in the project.
    pub destination: PathBuf,
}

/// Result of applying every placement directive of a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementReport {
    /// Items copied or moved, in directive order.
    pub placed: Vec<PlacedItem>,
    /// Directives that were skipped.
    pub warnings: Vec<PlacementWarning>,
}

/// Directory a directive writes into.
pub fn destination_dir(project_root: &Path, destination: &str) -> PathBuf {
    let trimmed = destination.trim_start_matches("./").trim_start_matches(".\\");
    if trimmed.is_empty() || trimmed == "." {
        project_root.to_path_buf()
    } else {
        project_root.join(trimmed)
    }
}

fn owner_record<'a>(
    local: &'a LocalIndex,
    owner: &PackageRequirement,
    target: &ToolchainTag,
) -> Option<&'a ArtifactRecord> {
    local.find_owner(&owner.name, owner.version.as_ref(), target)
}

/// Paths inside `root` matching `source_glob`.
fn expand(root: &Path, source_glob: &str) -> Vec<PathBuf> {
    let escaped = glob::Pattern::escape(&root.to_string_lossy());
    let pattern = format!("{escaped}/{}", source_glob.trim_start_matches(['/', '\\']));
    match glob::glob(&pattern) {
        Ok(paths) => {
            let mut matches: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
            matches.sort();
            matches
        }
        Err(e) => {
            debug!("Invalid glob '{pattern}': {e}");
            Vec::new()
        }
    }
}

fn copy_item(item: &Path, dest_dir: &Path) -> Result<PathBuf, String> {
    let name = item.file_name().ok_or("item has no file name")?;
    let dest = dest_dir.join(name);
    if item.is_dir() {
        let options = fs_extra::dir::CopyOptions::new().overwrite(true);
        fs_extra::dir::copy(item, dest_dir, &options).map_err(|e| e.to_string())?;
    } else {
        std::fs::copy(item, &dest).map_err(|e| e.to_string())?;
    }
    Ok(dest)
}

fn move_item(item: &Path, dest_dir: &Path) -> Result<PathBuf, String> {
    let name = item.file_name().ok_or("item has no file name")?;
    let dest = dest_dir.join(name);
    if dest.is_dir() {
        std::fs::remove_dir_all(&dest).map_err(|e| e.to_string())?;
    } else if dest.exists() {
        std::fs::remove_file(&dest).map_err(|e| e.to_string())?;
    }
    if std::fs::rename(item, &dest).is_err() {
        let options = fs_extra::dir::CopyOptions::new().overwrite(true);
        fs_extra::move_items(&[item], dest_dir, &options).map_err(|e| e.to_string())?;
    }
    Ok(dest)
}

/// Apply every directive against the installed artifacts in `local`.
pub fn apply_directives(
    project_root: &Path,
    directives: &BTreeMap<PackageRequirement, Vec<DependencyDirective>>,
    local: &LocalIndex,
    target: &ToolchainTag,
) -> PlacementReport {
    let mut report = PlacementReport::default();

    for (owner, list) in directives {
        if list.is_empty() {
            continue;
        }
        let Some(record) = owner_record(local, owner, target) else {
            report.warnings.push(PlacementWarning::OwnerMissing {
                owner: owner.clone(),
            });
            continue;
        };
        let root = LocalIndex::root_of(record);

        for directive in list {
            let items = expand(&root, &directive.source_glob);
            if items.is_empty() {
                report.warnings.push(PlacementWarning::NoMatch {
                    owner: owner.clone(),
                    pattern: root.join(&directive.source_glob).display().to_string(),
                });
                continue;
            }

            let dest_dir = destination_dir(project_root, &directive.destination);
            if let Err(e) = std::fs::create_dir_all(&dest_dir) {
                report.warnings.push(PlacementWarning::Failed {
                    owner: owner.clone(),
                    item: dest_dir.clone(),
                    reason: e.to_string(),
                });
                continue;
            }

            info!("{}: {directive}", owner.name);
            for item in items {
                let placed = match directive.command {
                    DirectiveCommand::Copy => copy_item(&item, &dest_dir),
                    DirectiveCommand::Move => move_item(&item, &dest_dir),
                };
                match placed {
                    Ok(destination) => report.placed.push(PlacedItem {
                        owner: owner.clone(),
                        command: directive.command,
                        source: item,
                        destination,
                    }),
                    Err(reason) => report.warnings.push(PlacementWarning::Failed {
                        owner: owner.clone(),
                        item,
                        reason,
                    }),
                }
            }
        }
    }

    report
}

/// A directive whose effect is not present on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementIssue {
    /// The owning artifact is not installed.
    OwnerMissing {
        /// Requirement that declared the directives.
        owner: PackageRequirement,
    },
    /// A matched item has no counterpart at its destination.
    NotPlaced {
        /// Requirement that declared the directive.
        owner: PackageRequirement,
        /// The directive that was not applied.
        directive: DependencyDirective,
        /// Source item inside the owner's cache directory.
        item: PathBuf,
    },
}

impl fmt::Display for PlacementIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OwnerMissing { owner } => write!(f, "'{owner}' is not installed"),
            Self::NotPlaced {
                owner,
                directive,
                item,
            } => write!(f, "'{owner}': {directive} not applied ({})", item.display()),
        }
    }
}

/// Check which directives still need to be applied, without touching disk.
///
/// A copied item is placed when its destination exists. A move is pending
/// while the glob still matches inside the artifact.
pub fn verify_placements(
    project_root: &Path,
    directives: &BTreeMap<PackageRequirement, Vec<DependencyDirective>>,
    local: &LocalIndex,
    target: &ToolchainTag,
) -> Vec<PlacementIssue> {
    let mut issues = Vec::new();

    for (owner, list) in directives {
        if list.is_empty() {
            continue;
        }
        let Some(record) = owner_record(local, owner, target) else {
            issues.push(PlacementIssue::OwnerMissing {
                owner: owner.clone(),
            });
            continue;
        };
        let root = LocalIndex::root_of(record);

        for directive in list {
            let dest_dir = destination_dir(project_root, &directive.destination);
            for item in expand(&root, &directive.source_glob) {
                let placed = match directive.command {
                    DirectiveCommand::Copy => item
                        .file_name()
                        .is_some_and(|name| dest_dir.join(name).exists()),
                    DirectiveCommand::Move => false,
                };
                if !placed {
                    issues.push(PlacementIssue::NotPlaced {
                        owner: owner.clone(),
                        directive: directive.clone(),
                        item,
                    });
                }
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::decode_local_dir;
    use crate::manifest::{parse_directive, parse_requirement};
    use crate::testing::ts;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        cache: PathBuf,
        project: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let cache = dir.path().join("cache");
            let project = dir.path().join("project");
            std::fs::create_dir_all(&cache).unwrap();
            std::fs::create_dir_all(&project).unwrap();
            Self {
                _dir: dir,
                cache,
                project,
            }
        }

        fn file(&self, rel: &str) {
            let path = self.cache.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, rel).unwrap();
        }

        fn local(&self) -> LocalIndex {
            LocalIndex::scan(&self.cache).unwrap()
        }
    }

    fn directives(entries: &[(&str, &str)]) -> BTreeMap<PackageRequirement, Vec<DependencyDirective>> {
        let mut map: BTreeMap<PackageRequirement, Vec<DependencyDirective>> = BTreeMap::new();
        for (owner, directive) in entries {
            map.entry(parse_requirement(owner).unwrap())
                .or_default()
                .push(parse_directive(directive).unwrap());
        }
        map
    }

    fn vs2019() -> ToolchainTag {
        ToolchainTag::new("VS2019").unwrap()
    }

    #[test]
    fn test_copy_files_and_directories() {
        let fx = Fixture::new();
        fx.file("opencv@4.5.1@VS2019/bin/opencv_core.dll");
        fx.file("opencv@4.5.1@VS2019/bin/opencv_imgproc.dll");
        fx.file("opencv@4.5.1@VS2019/bin/readme.txt");
        fx.file("opencv@4.5.1@VS2019/include/opencv2/core.hpp");
        let map = directives(&[
            ("opencv", "copy bin/*.dll to ./"),
            ("opencv", "copy include to third_party"),
        ]);

        let report = apply_directives(&fx.project, &map, &fx.local(), &vs2019());

        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.placed.len(), 3);
        assert!(fx.project.join("opencv_core.dll").exists());
        assert!(fx.project.join("opencv_imgproc.dll").exists());
        assert!(!fx.project.join("readme.txt").exists());
        assert!(fx.project.join("third_party/include/opencv2/core.hpp").exists());
        assert!(fx.cache.join("opencv@4.5.1@VS2019/bin/opencv_core.dll").exists());

        assert!(verify_placements(&fx.project, &map, &fx.local(), &vs2019()).is_empty());
    }

    #[test]
    fn test_move_removes_from_artifact() {
        let fx = Fixture::new();
        fx.file("ffmpeg@6.0@VS2019/bin/ffmpeg.exe");
        let map = directives(&[("ffmpeg==6.0", "move bin/*.exe to tools")]);

        assert_eq!(
            verify_placements(&fx.project, &map, &fx.local(), &vs2019()).len(),
            1
        );
        let report = apply_directives(&fx.project, &map, &fx.local(), &vs2019());

        assert_eq!(report.placed.len(), 1);
        assert!(fx.project.join("tools/ffmpeg.exe").exists());
        assert!(!fx.cache.join("ffmpeg@6.0@VS2019/bin/ffmpeg.exe").exists());
        assert!(verify_placements(&fx.project, &map, &fx.local(), &vs2019()).is_empty());
    }

    #[test]
    fn test_warnings_for_missing_owner_and_empty_glob() {
        let fx = Fixture::new();
        fx.file("zlib@1.3@VS2019/include/zlib.h");
        let map = directives(&[("zlib", "copy bin/*.dll to ./"), ("curl", "copy bin to ./")]);

        let report = apply_directives(&fx.project, &map, &fx.local(), &vs2019());

        assert!(report.placed.is_empty());
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings.iter().any(|w| matches!(
            w,
            PlacementWarning::OwnerMissing { owner } if owner.name == "curl"
        )));
        assert!(report.warnings.iter().any(|w| matches!(w, PlacementWarning::NoMatch { .. })));
    }

    #[test]
    fn test_owner_prefers_requested_version() {
        let fx = Fixture::new();
        fx.file("zlib@1.2@VS2019/bin/old.dll");
        fx.file("zlib@1.3@VS2019/bin/new.dll");
        let map = directives(&[("zlib==1.2", "copy bin/*.dll to ./")]);

        apply_directives(&fx.project, &map, &fx.local(), &vs2019());

        assert!(fx.project.join("old.dll").exists());
        assert!(!fx.project.join("new.dll").exists());
    }

    #[test]
    fn test_destination_dir() {
        let root = Path::new("/p");
        assert_eq!(destination_dir(root, "./"), PathBuf::from("/p"));
        assert_eq!(destination_dir(root, "."), PathBuf::from("/p"));
        assert_eq!(destination_dir(root, "./lib"), PathBuf::from("/p/lib"));
        assert_eq!(destination_dir(root, "bin/x64"), PathBuf::from("/p/bin/x64"));
    }

    #[test]
    fn test_owner_record_uses_local_decode() {
        let (name, version, tc) = decode_local_dir("zlib-1.3-VS2019").unwrap();
        let record = ArtifactRecord::new(name, version, tc, None, "/c/zlib-1.3-VS2019", ts(1)).unwrap();
        let local = LocalIndex::from_records([record]);
        let owner = parse_requirement("zlib==1.3").unwrap();
        assert!(owner_record(&local, &owner, &vs2019()).is_some());
    }
}
