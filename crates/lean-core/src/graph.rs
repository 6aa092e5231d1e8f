//! Manifest discovery and transitive dependency expansion.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use lean_schema::{DependencyDirective, PackageRequirement, ToolchainTag};
use tracing::{debug, trace};
use walkdir::{DirEntry, WalkDir};

use crate::manifest::{self, ParsedManifest};
use crate::paths::DEP_TREE_DIR;
use crate::remote::RemoteRepository;
use crate::reporter::Reporter;

/// Only directories with this name (any case) are searched below the root.
pub const DEPENDENCY_DIR: &str = "dependency";

/// Extension of manifests found in dependency directories.
pub const MANIFEST_EXT: &str = "manifest";

/// The flattened requirement set of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedManifest {
    /// Direct then transitive requirements, each once, in discovery order.
    pub requirements: Vec<PackageRequirement>,
    /// Placement directives keyed by the requirement that declared them.
    pub directives: BTreeMap<PackageRequirement, Vec<DependencyDirective>>,
    /// Source-control references found in local manifests.
    pub source_refs: Vec<String>,
    /// Toolchain tag of the first selected root manifest that has one.
    pub toolchain: Option<ToolchainTag>,
    /// Manifest files that were read.
    pub manifests: Vec<PathBuf>,
}

impl ResolvedManifest {
    /// Whether `requirement` has placement directives.
    pub fn has_directives(&self, requirement: &PackageRequirement) -> bool {
        self.directives
            .get(requirement)
            .is_some_and(|d| !d.is_empty())
    }

    fn add_requirement(&mut self, requirement: &PackageRequirement) -> bool {
        if self.requirements.contains(requirement) {
            return false;
        }
        self.requirements.push(requirement.clone());
        true
    }

    fn add_directive(&mut self, owner: PackageRequirement, directive: DependencyDirective) {
        let entry = self.directives.entry(owner).or_default();
        if !entry.contains(&directive) {
            entry.push(directive);
        }
    }
}

fn is_dependency_dir(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(DEPENDENCY_DIR))
}

fn descend_into(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    is_dependency_dir(entry.path()) || entry.path().parent().is_some_and(is_dependency_dir)
}

/// Find the manifest files that make up a project.
///
/// Files at `root` count only when named in `selected`. Below the root only
/// `dependency` directories are entered from a non-`dependency` directory, and
/// every `*.manifest` inside them is used. With `root_only` nothing below the
/// root is read.
pub fn discover_manifests(root: &Path, selected: &[String], root_only: bool) -> Vec<PathBuf> {
    let walker = WalkDir::new(root)
        .max_depth(if root_only { 1 } else { usize::MAX })
        .sort_by_file_name()
        .into_iter()
        .filter_entry(descend_into);

    let mut found = Vec::new();
    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        let wanted = if entry.depth() == 1 {
            selected.iter().any(|s| s.as_str() == file_name)
        } else {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext == MANIFEST_EXT)
        };
        if wanted {
            found.push(entry.into_path());
        }
    }

    // Selected root manifests first, in the order they were given.
    found.sort_by_key(|p| {
        let at_root = p.parent() == Some(root);
        let rank = p
            .file_name()
            .and_then(|n| selected.iter().position(|s| s.as_str() == n.to_string_lossy()))
            .filter(|_| at_root)
            .unwrap_or(usize::MAX);
        (rank, p.clone())
    });
    debug!("Discovered {} manifest(s) under {}", found.len(), root.display());
    found
}

fn report_parse_warnings(reporter: &dyn Reporter, source: &str, parsed: &ParsedManifest) {
    for warning in &parsed.warnings {
        reporter.warning(&format!("{source}: {warning}"));
    }
}

/// Descriptor paths for `requirement`, most specific first.
pub fn descriptor_paths(os_dir: &str, requirement: &PackageRequirement) -> Vec<String> {
    let base = format!("{}/{DEP_TREE_DIR}", os_dir.trim_end_matches('/'));
    let mut paths = Vec::with_capacity(2);
    if let Some(version) = &requirement.version {
        paths.push(format!("{base}/{}@{}.dep", requirement.name, version.as_str()));
    }
    paths.push(format!("{base}/{}.dep", requirement.name));
    paths
}

async fn fetch_descriptor(
    remote: &dyn RemoteRepository,
    os_dir: &str,
    requirement: &PackageRequirement,
) -> Option<(String, ParsedManifest)> {
    for path in descriptor_paths(os_dir, requirement) {
        match remote.read_optional(&path).await {
            Ok(Some(bytes)) => {
                let parsed = manifest::parse_manifest(&String::from_utf8_lossy(&bytes));
                return Some((path, parsed));
            }
            Ok(None) => trace!("No descriptor at {path}"),
            Err(e) => debug!("Descriptor {path} unreadable, treating as absent: {e}"),
        }
    }
    None
}

/// Read `manifests`, then expand every requirement through the remote
/// `dep_tree` descriptors under `os_dir`.
///
/// Each `(name, version)` is expanded at most once, so cyclic descriptors
/// terminate. Unreadable manifests and descriptors are reported and skipped.
pub async fn resolve_graph(
    manifests: &[PathBuf],
    remote: &dyn RemoteRepository,
    os_dir: &str,
    reporter: &dyn Reporter,
) -> ResolvedManifest {
    let mut resolved = ResolvedManifest::default();

    for path in manifests {
        let parsed = match manifest::read_manifest(path) {
            Ok(parsed) => parsed,
            Err(e) => {
                reporter.warning(&format!("Cannot read manifest {}: {e}", path.display()));
                continue;
            }
        };
        report_parse_warnings(reporter, &path.display().to_string(), &parsed);

        if resolved.toolchain.is_none() {
            resolved.toolchain = parsed.toolchain.clone();
        }
        for requirement in &parsed.requirements {
            resolved.add_requirement(requirement);
        }
        for (owner, directive) in parsed.directives {
            resolved.add_directive(owner, directive);
        }
        for source in parsed.source_refs {
            if !resolved.source_refs.contains(&source) {
                resolved.source_refs.push(source);
            }
        }
        resolved.manifests.push(path.clone());
    }

    let mut stack: Vec<PackageRequirement> = resolved.requirements.clone();
    let mut visited: HashSet<PackageRequirement> = HashSet::new();

    while let Some(current) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        let Some((path, descriptor)) = fetch_descriptor(remote, os_dir, &current).await else {
            continue;
        };
        trace!("Expanding {current} via {path}");
        report_parse_warnings(reporter, &path, &descriptor);

        for requirement in &descriptor.requirements {
            resolved.add_requirement(requirement);
            if !visited.contains(requirement) {
                stack.push(requirement.clone());
            }
        }
        for (owner, directive) in descriptor.directives {
            resolved.add_directive(owner, directive);
        }
    }

    debug!(
        "Resolved {} requirement(s), {} with directives",
        resolved.requirements.len(),
        resolved.directives.len()
    );
    resolved
}
