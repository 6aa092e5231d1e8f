//! `lean remote`

use anyhow::Result;
use lean_core::Reporter;
use lean_core::sync::remote_listing;

use super::Context;
use crate::ui::table::remote_table;

/// List remote artifacts for this host, optionally filtered by package name.
pub async fn remote(filter: Option<&str>, quiet: bool) -> Result<()> {
    let mut ctx = Context::open(quiet).await?;
    let mut records = remote_listing(&mut ctx.session, &ctx.output).await?;
    if let Some(filter) = filter {
        let needle = filter.to_lowercase();
        records.retain(|r| r.name().to_lowercase().contains(&needle));
    }

    if records.is_empty() {
        ctx.output.info("No packages found");
        return Ok(());
    }
    ctx.output.line(&remote_table(&records).to_string());
    Ok(())
}
