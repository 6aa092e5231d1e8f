//! Tabular output for `lean remote` and `lean status`.

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use lean_core::diff::{Classification, DiffReport};
use lean_schema::ArtifactRecord;

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::DarkGrey)));
    table
}

/// One row per remote artifact: package, version, toolchain, channel, date.
pub fn remote_table(records: &[ArtifactRecord]) -> Table {
    let mut table = table(&["package", "version", "toolchain", "channel", "date"]);
    for record in records {
        let channel = record.channel.map_or("-", |c| c.as_str());
        table.add_row(vec![
            Cell::new(record.name()).fg(Color::Cyan),
            Cell::new(record.version.as_str()),
            Cell::new(record.toolchain()),
            Cell::new(channel),
            Cell::new(record.timestamp.format("%Y-%m-%d %H:%M")).fg(Color::DarkGrey),
        ]);
    }
    table
}

/// One row per requirement with its classification.
pub fn status_table(report: &DiffReport) -> Table {
    let mut table = table(&["requirement", "artifact", "state"]);
    for classification in &report.classifications {
        let color = match classification {
            Classification::Satisfied { .. } => Color::Green,
            Classification::Missing { .. } | Classification::Stale { .. } => Color::Yellow,
            Classification::Unresolved { .. } => Color::Red,
        };
        let state = match classification {
            Classification::Unresolved { reason, .. } => reason.to_string(),
            other => other.label().to_string(),
        };
        let artifact = classification
            .identity()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        table.add_row(vec![
            Cell::new(classification.requirement()).fg(Color::Cyan),
            Cell::new(artifact),
            Cell::new(state).fg(color),
        ]);
    }
    table
}
