//! Colors, glyphs and column widths shared by every renderer.

use crossterm::style::Color;

#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub colors: ColorScheme,
    pub icons: Icons,
    pub layout: Layout,
}

#[derive(Debug, Clone)]
pub struct ColorScheme {
    /// Artifact identities in status lines
    pub package_name: Color,
    pub success: Color,
    pub error: Color,
    /// Download and extraction in progress
    pub active: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            package_name: Color::Cyan,
            success: Color::Green,
            error: Color::Red,
            active: Color::Blue,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Icons {
    pub active: &'static str,
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            active: "●",
            success: "✓",
            error: "✗",
            warning: "⚠",
            info: "ℹ",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    /// Width of the `name@version@toolchain` column
    pub identity_width: usize,
    pub bar_width: usize,
    /// Width of labels in the sync summary block
    pub label_width: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            identity_width: 36,
            bar_width: 24,
            label_width: 16,
        }
    }
}

/// Human-readable byte count (`512 B`, `1.5 KB`, `40.0 MB`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
