//! Terminal output.
//!
//! - [`theme`] - Colors, icons and widths
//! - [`progress`] - Download progress formatting
//! - [`output`] - [`Output`], the terminal [`lean_core::Reporter`]
//! - [`table`] - Tables for `lean remote` and `lean status`

pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use output::Output;
pub use theme::Theme;
