//! `lean fetch <package>`

use std::path::Path;

use anyhow::{Context as _, Result, bail};
use lean_core::Reporter;
use lean_core::diff::Classification;
use lean_core::install::InstallOutcome;
use lean_core::manifest::{parse_requirement, read_toolchain_tag};
use lean_core::sync::fetch_one;
use lean_schema::ToolchainTag;

use super::Context;

/// Install one package without touching any manifest.
///
/// The toolchain is `--compiler`, else the tag of `--manifest`, else the
/// configured default.
pub async fn fetch(
    root: &Path,
    package: &str,
    manifest: Option<&str>,
    compiler: Option<&str>,
    quiet: bool,
) -> Result<()> {
    let requirement = parse_requirement(package)?;
    let explicit = compiler
        .map(ToolchainTag::new)
        .transpose()
        .with_context(|| format!("Invalid toolchain '{}'", compiler.unwrap_or_default()))?;
    let tagged = manifest.and_then(|m| read_toolchain_tag(&root.join(m)));

    let mut ctx = Context::open(quiet).await?;
    let target = ctx
        .session
        .target_toolchain(explicit.as_ref(), tagged.as_ref());
    let report = fetch_one(&mut ctx.session, &requirement, &target, &ctx.output).await?;

    match (&report.classification, report.outcome) {
        (Classification::Unresolved { reason, .. }, _) => bail!("{requirement}: {reason}"),
        (Classification::Satisfied { local, .. }, _) => {
            ctx.output.success(&format!("{} is up to date", local.identity));
        }
        (_, Some(InstallOutcome::Installed { identity, path, .. })) => {
            ctx.output
                .success(&format!("Installed {identity} into {}", path.display()));
        }
        (_, Some(failed)) => bail!("{failed}"),
        (_, None) => {}
    }
    Ok(())
}
