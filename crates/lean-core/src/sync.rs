//! Top-level operations: sync a project, fetch one package, report status and
//! list the remote.
//!
//! Each operation drives a [`SyncSession`] through resolution, classification
//! and, where it applies, installation and post-install side effects. Only a
//! lost connection or a missing OS directory aborts a run; every other failure
//! is recorded per item and surfaces in the returned summary.

use std::path::PathBuf;
use std::time::Instant;

use lean_schema::{ArtifactIdentity, ArtifactRecord, PackageRequirement, ToolchainTag};
use tracing::{debug, info};

use crate::diff::{self, Classification, DiffReport, ResolutionWarning, UnresolvedReason};
use crate::host::{self, HostIntegration, PathRegistration};
use crate::install::{self, InstallOutcome};
use crate::placement::{self, PlacementIssue, PlacementReport};
use crate::reporter::Reporter;
use crate::request::ResolutionPlan;
use crate::session::{SyncError, SyncSession};

/// Knobs for [`sync`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Read only the selected root manifests, not `dependency` directories.
    pub root_only: bool,
}

/// Everything a sync did, per category.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    /// Toolchain the graph resolved against.
    pub target: Option<ToolchainTag>,
    /// Requirements with no matching remote artifact.
    pub unresolved: Vec<(PackageRequirement, UnresolvedReason)>,
    /// Artifacts absent from the cache before the run.
    pub missing: Vec<ArtifactIdentity>,
    /// Artifacts whose remote copy was newer than the cached one.
    pub stale: Vec<ArtifactIdentity>,
    /// Artifacts already current.
    pub satisfied: Vec<ArtifactIdentity>,
    /// Artifacts installed by this run.
    pub updated: Vec<ArtifactIdentity>,
    /// Downloads that failed, with the reason.
    pub fetch_failed: Vec<(ArtifactIdentity, String)>,
    /// Archives that could not be unpacked, with the reason.
    pub extract_failed: Vec<(ArtifactIdentity, String)>,
    /// Toolchain fallbacks and similar notes from resolution.
    pub warnings: Vec<ResolutionWarning>,
    /// Placement directives applied after installing.
    pub placement: PlacementReport,
    /// PATH registration; `None` when nothing qualified or the path was unreadable.
    pub path: Option<PathRegistration>,
    /// Source-reference lines found in manifests, left untouched.
    pub source_refs: Vec<String>,
}

impl SyncSummary {
    fn classify(&mut self, report: &DiffReport) {
        self.unresolved = report
            .unresolved()
            .into_iter()
            .map(|(r, reason)| (r.clone(), reason))
            .collect();
        self.missing = report.missing().iter().map(|r| r.identity.clone()).collect();
        self.stale = report.stale().iter().map(|r| r.identity.clone()).collect();
        self.satisfied = report.satisfied().iter().map(|r| r.identity.clone()).collect();
        self.warnings = report.warnings.clone();
    }

    fn record(&mut self, outcome: InstallOutcome) {
        match outcome {
            InstallOutcome::Installed { identity, .. } => self.updated.push(identity),
            InstallOutcome::FetchFailed { identity, reason } => {
                self.fetch_failed.push((identity, reason));
            }
            InstallOutcome::ExtractFailed { identity, reason } => {
                self.extract_failed.push((identity, reason));
            }
        }
    }

    /// Number of per-item failures.
    pub fn failure_count(&self) -> usize {
        self.unresolved.len() + self.fetch_failed.len() + self.extract_failed.len()
    }

    /// True when every requirement resolved and every install succeeded.
    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }
}

fn report_resolution(report: &DiffReport, reporter: &dyn Reporter) {
    for warning in &report.warnings {
        reporter.warning(&warning.to_string());
    }
    for (requirement, reason) in report.unresolved() {
        reporter.error(&format!("{requirement}: {reason}"));
    }
}

/// Bring the project described by `plan` up to date.
///
/// Resolves the manifest graph, installs missing and stale artifacts one by
/// one, applies placement directives and registers `bin/` directories of
/// packages without directives on the persistent search path.
///
/// # Errors
///
/// Only connection failures and a missing OS directory abort the run.
pub async fn sync(
    session: &mut SyncSession,
    plan: &ResolutionPlan,
    options: SyncOptions,
    host: &dyn HostIntegration,
    reporter: &dyn Reporter,
) -> Result<SyncSummary, SyncError> {
    let started = Instant::now();
    let root = &plan.project_root;
    reporter.section("Resolving");

    session.sync_import_cmake(reporter).await;
    let resolved = session
        .resolve_manifests(root, &plan.manifests, options.root_only, reporter)
        .await?;
    let target = session.target_toolchain(plan.toolchain_override.as_ref(), resolved.toolchain.as_ref());
    info!(
        "Syncing {} requirement(s) for {target}",
        resolved.requirements.len()
    );

    let report = session.diff(&resolved.requirements, &target, reporter).await?;
    report_resolution(&report, reporter);

    let mut summary = SyncSummary {
        target: Some(target.clone()),
        source_refs: resolved.source_refs.clone(),
        ..SyncSummary::default()
    };
    summary.classify(&report);

    let fetch_plan = report.fetch_plan();
    if !fetch_plan.is_empty() {
        reporter.section("Fetching");
        let outcomes =
            install::install_all(session.remote(), session.cache_dir(), &fetch_plan, reporter)
                .await;
        for outcome in outcomes {
            summary.record(outcome);
        }
        session.invalidate_local();
    }

    let local = session.local_index()?;

    if !resolved.directives.is_empty() {
        reporter.section("Placing");
        summary.placement = placement::apply_directives(root, &resolved.directives, &local, &target);
        for warning in &summary.placement.warnings {
            reporter.warning(&warning.to_string());
        }
    }

    let bins = host::bin_dirs(&resolved.requirements, &resolved.directives, &local, &target);
    if !bins.is_empty() {
        match host::register_bin_dirs(host, &bins) {
            Ok(registration) => {
                if let Some(reason) = &registration.denied {
                    reporter.warning(&format!("PATH not updated: {reason}"));
                }
                for dir in &registration.added {
                    reporter.info(&format!("Added {} to PATH", dir.display()));
                }
                summary.path = Some(registration);
            }
            Err(e) => reporter.warning(&format!("Cannot update PATH: {e}")),
        }
    }

    reporter.summary(
        summary.updated.len(),
        "updated",
        started.elapsed().as_secs_f64(),
    );
    Ok(summary)
}

/// Result of [`fetch_one`].
#[derive(Debug, Clone)]
pub struct FetchReport {
    /// State of the requirement before any install.
    pub classification: Classification,
    /// Set when resolution fell back to another toolchain.
    pub warning: Option<ResolutionWarning>,
    /// Set when an install was attempted.
    pub outcome: Option<InstallOutcome>,
}

/// Resolve a single requirement and install it when missing or stale.
///
/// # Errors
///
/// Only connection failures and a missing OS directory are errors; an
/// unresolvable requirement is reported in the classification.
pub async fn fetch_one(
    session: &mut SyncSession,
    requirement: &PackageRequirement,
    target: &ToolchainTag,
    reporter: &dyn Reporter,
) -> Result<FetchReport, SyncError> {
    let remote = session.remote_index(reporter).await?;
    let local = session.local_index()?;
    let (classification, warning) = diff::classify(requirement, &remote, &local, target);
    if let Some(warning) = &warning {
        reporter.warning(&warning.to_string());
    }
    debug!("{requirement}: {}", classification.label());

    let record = match &classification {
        Classification::Missing { remote: record, .. }
        | Classification::Stale { remote: record, .. } => record.clone(),
        Classification::Unresolved { .. } | Classification::Satisfied { .. } => {
            return Ok(FetchReport {
                classification,
                warning,
                outcome: None,
            });
        }
    };

    reporter.section("Fetching");
    let outcome =
        install::install_artifact(session.remote(), session.cache_dir(), &record, reporter).await;
    session.invalidate_local();
    Ok(FetchReport {
        classification,
        warning,
        outcome: Some(outcome),
    })
}

/// Read-only view of a project.
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Toolchain the graph resolved against.
    pub target: ToolchainTag,
    /// Per-requirement classification.
    pub report: DiffReport,
    /// Directives whose destination is absent or differs from the source.
    pub placement_issues: Vec<PlacementIssue>,
    /// `bin/` directories not on the persistent path; `None` if it could not be read.
    pub unregistered: Option<Vec<PathBuf>>,
    /// Source-reference lines found in manifests.
    pub source_refs: Vec<String>,
}

impl StatusReport {
    /// Nothing to install, place or register.
    pub fn is_clean(&self) -> bool {
        self.report.is_up_to_date()
            && self.placement_issues.is_empty()
            && self.unregistered.as_ref().is_none_or(Vec::is_empty)
    }
}

/// Classify the project without changing anything.
///
/// # Errors
///
/// Only connection failures and a missing OS directory are errors.
pub async fn status(
    session: &mut SyncSession,
    plan: &ResolutionPlan,
    options: SyncOptions,
    host: &dyn HostIntegration,
    reporter: &dyn Reporter,
) -> Result<StatusReport, SyncError> {
    let resolved = session
        .resolve_manifests(&plan.project_root, &plan.manifests, options.root_only, reporter)
        .await?;
    let target = session.target_toolchain(plan.toolchain_override.as_ref(), resolved.toolchain.as_ref());
    let report = session.diff(&resolved.requirements, &target, reporter).await?;
    let local = session.local_index()?;

    let placement_issues =
        placement::verify_placements(&plan.project_root, &resolved.directives, &local, &target);
    let bins = host::bin_dirs(&resolved.requirements, &resolved.directives, &local, &target);
    let unregistered = match host::verify_path_registration(host, &bins) {
        Ok(dirs) => Some(dirs),
        Err(e) => {
            reporter.warning(&format!("Cannot read PATH: {e}"));
            None
        }
    };

    Ok(StatusReport {
        target,
        report,
        placement_issues,
        unregistered,
        source_refs: resolved.source_refs.clone(),
    })
}

/// Every artifact under the matched OS directory, by name then newest first.
///
/// # Errors
///
/// Only connection failures and a missing OS directory are errors.
pub async fn remote_listing(
    session: &mut SyncSession,
    reporter: &dyn Reporter,
) -> Result<Vec<ArtifactRecord>, SyncError> {
    let index = session.remote_index(reporter).await?;
    let mut names: Vec<_> = index.names().collect();
    names.sort();
    Ok(names
        .into_iter()
        .flat_map(|name| index.versions(name).iter().cloned())
        .collect())
}
