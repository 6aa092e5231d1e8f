//! `lean status`

use std::path::Path;

use anyhow::{Result, bail};
use lean_core::Reporter;
use lean_core::request::ResolutionRequest;
use lean_core::sync::{self, SyncOptions};

use super::Context;
use crate::Selection;
use crate::ui::table::status_table;

/// Show what a sync would do, without changing anything.
pub async fn status(root: &Path, selection: &Selection, quiet: bool) -> Result<()> {
    if !selection.spec.is_empty() {
        bail!("--spec edits manifests and cannot be used with status");
    }
    let mut ctx = Context::open(quiet).await?;
    let request = ResolutionRequest::from_flags(
        selection.flags(),
        ctx.session.default_toolchain(),
        &ctx.output,
    )?;
    let plan = request.plan(root, &mut ctx.session, &ctx.output).await?;
    let host = ctx.host();
    let options = SyncOptions {
        root_only: selection.root_only,
    };
    let status = sync::status(&mut ctx.session, &plan, options, host.as_ref(), &ctx.output).await?;

    let output = &ctx.output;
    output.section(&format!("Status ({})", status.target));
    output.line(&status_table(&status.report).to_string());

    if !status.placement_issues.is_empty() {
        output.section("Placement");
        for issue in &status.placement_issues {
            output.warning(&issue.to_string());
        }
    }
    if let Some(dirs) = &status.unregistered {
        for dir in dirs {
            output.warning(&format!("{} is not on PATH", dir.display()));
        }
    }
    for source in &status.source_refs {
        output.info(&format!("Source reference: {source}"));
    }

    if status.is_clean() {
        output.success("Up to date");
    } else {
        output.info("Run `lean sync` to apply");
    }
    Ok(())
}
