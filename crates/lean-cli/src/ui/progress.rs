//! Download progress formatting.

use super::theme::format_size;

/// Bar of `width` cells for `current` out of `total`.
pub fn progress_bar(current: u64, total: u64, width: usize) -> String {
    let filled = if total == 0 {
        width
    } else {
        ((current.min(total) as f64 / total as f64) * width as f64).round() as usize
    };
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// `bar  1.2 MB / 4.0 MB  30%`, or just the byte count when the total is unknown.
pub fn format_download_progress(current: u64, total: Option<u64>, width: usize) -> String {
    match total.filter(|&t| t > 0) {
        Some(total) => {
            let percent = (current.min(total) * 100) / total;
            format!(
                "{}  {} / {}  {percent:>3}%",
                progress_bar(current, total, width),
                format_size(current),
                format_size(total)
            )
        }
        None => format!("{} fetched", format_size(current)),
    }
}
