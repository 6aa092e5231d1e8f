//! `lean sync`

use std::path::Path;

use anyhow::{Result, bail};
use crossterm::style::Stylize;
use lean_core::Reporter;
use lean_core::request::ResolutionRequest;
use lean_core::sync::{self, SyncOptions, SyncSummary};
use lean_schema::ArtifactIdentity;

use super::Context;
use crate::Selection;
use crate::ui::Output;

pub async fn sync(root: &Path, selection: &Selection, quiet: bool) -> Result<()> {
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

    let summary = sync::sync(&mut ctx.session, &plan, options, host.as_ref(), &ctx.output).await?;
    render_summary(&summary, &ctx.output);

    if !summary.is_success() {
        bail!("{} requirement(s) failed", summary.failure_count());
    }
    Ok(())
}

fn render_summary(summary: &SyncSummary, output: &Output) {
    if !summary.source_refs.is_empty() {
        output.info(&format!(
            "Source references not handled: {}",
            summary.source_refs.join(", ")
        ));
    }
    for (identity, reason) in summary.fetch_failed.iter().chain(&summary.extract_failed) {
        output.error(&format!("{identity}: {reason}"));
    }
    if output.is_quiet() {
        return;
    }

    let width = output.theme().layout.label_width;
    let row = |label: &str, items: Vec<String>| {
        let mut line = format!("  {}{}", format!("{label:<width$}").dark_grey(), items.len());
        if !items.is_empty() {
            line.push_str(&format!("  {}", items.join(", ")));
        }
        output.line(&line);
    };
    let ids = |list: &[ArtifactIdentity]| -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    };
    let failed = |list: &[(ArtifactIdentity, String)]| -> Vec<String> {
        list.iter().map(|(id, _)| id.to_string()).collect()
    };

    output.section("Summary");
    if let Some(target) = &summary.target {
        output.line(&format!(
            "  {}{target}",
            format!("{:<width$}", "toolchain").dark_grey()
        ));
    }
    row(
        "unresolved",
        summary.unresolved.iter().map(|(r, _)| r.to_string()).collect(),
    );
    row("missing", ids(&summary.missing));
    row("stale", ids(&summary.stale));
    row("updated", ids(&summary.updated));
    row("fetch-failed", failed(&summary.fetch_failed));
    row("extract-failed", failed(&summary.extract_failed));
    row("satisfied", ids(&summary.satisfied));
    if !summary.placement.placed.is_empty() {
        output.line(&format!(
            "  {}{} item(s)",
            format!("{:<width$}", "placed").dark_grey(),
            summary.placement.placed.len()
        ));
    }
    if let Some(path) = &summary.path {
        row(
            "PATH added",
            path.added.iter().map(|d| d.display().to_string()).collect(),
        );
    }
}
