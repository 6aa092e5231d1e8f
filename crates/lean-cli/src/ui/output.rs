//! Terminal reporter.
//!
//! [`Output`] implements the core [`Reporter`] trait. Installs run one at a
//! time, so a single progress line is redrawn in place while an artifact
//! downloads and is replaced by its final status line. When stdout is not a
//! terminal only final lines are printed.

use std::io::{IsTerminal, Write, stdout};
use std::sync::{Mutex, PoisonError};

use crossterm::QueueableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use lean_core::Reporter;
use lean_schema::ArtifactIdentity;

use super::progress::format_download_progress;
use super::theme::{Theme, format_size};

#[derive(Debug)]
pub struct Output {
    theme: Theme,
    quiet: bool,
    interactive: bool,
    /// Whether a progress line is currently drawn.
    live: Mutex<bool>,
}

impl Output {
    pub fn new(quiet: bool) -> Self {
        Self {
            theme: Theme::default(),
            quiet,
            interactive: stdout().is_terminal(),
            live: Mutex::new(false),
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    fn identity_column(&self, id: &ArtifactIdentity) -> String {
        format!("{:<width$}", id.to_string(), width = self.theme.layout.identity_width)
    }

    /// Replace the progress line (if any) with `text`, or draw a new one.
    fn draw_live(&self, text: &str) {
        if !self.interactive || self.quiet {
            return;
        }
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = stdout();
        let _ = out.queue(MoveToColumn(0));
        let _ = out.queue(Clear(ClearType::CurrentLine));
        let _ = write!(out, "{text}");
        let _ = out.flush();
        *live = true;
    }

    /// Print a full line, first clearing any progress line.
    pub fn line(&self, text: &str) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = stdout();
        if *live {
            let _ = out.queue(MoveToColumn(0));
            let _ = out.queue(Clear(ClearType::CurrentLine));
            *live = false;
        }
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
    }

    fn status_line(&self, icon: &str, id: &ArtifactIdentity, detail: &str) -> String {
        format!(
            "  {icon} {} {detail}",
            self.identity_column(id).with(self.theme.colors.package_name)
        )
    }
}

impl Reporter for Output {
    fn section(&self, title: &str) {
        if self.quiet {
            return;
        }
        self.line("");
        self.line(&title.bold().to_string());
    }

    fn downloading(&self, id: &ArtifactIdentity, current: u64, total: Option<u64>) {
        let progress = format_download_progress(current, total, self.theme.layout.bar_width);
        let icon = self.theme.icons.active.with(self.theme.colors.active).to_string();
        self.draw_live(&self.status_line(&icon, id, &progress.dark_grey().to_string()));
    }

    fn extracting(&self, id: &ArtifactIdentity) {
        let icon = self.theme.icons.active.with(self.theme.colors.active).to_string();
        self.draw_live(&self.status_line(&icon, id, &"extracting".dark_grey().to_string()));
    }

    fn done(&self, id: &ArtifactIdentity, detail: &str, size: Option<u64>) {
        if self.quiet {
            return;
        }
        let detail = match size {
            Some(bytes) => format!("{detail} ({})", format_size(bytes)),
            None => detail.to_string(),
        };
        let icon = self.theme.icons.success.with(self.theme.colors.success).to_string();
        self.line(&self.status_line(&icon, id, &detail.with(self.theme.colors.success).to_string()));
    }

    fn failed(&self, id: &ArtifactIdentity, reason: &str) {
        let icon = self.theme.icons.error.with(self.theme.colors.error).to_string();
        let detail = format!("FAILED: {reason}");
        self.line(&self.status_line(&icon, id, &detail.with(self.theme.colors.error).to_string()));
    }

    fn info(&self, msg: &str) {
        if self.quiet {
            return;
        }
        self.line(&format!("  {} {msg}", self.theme.icons.info));
    }

    fn success(&self, msg: &str) {
        if self.quiet {
            return;
        }
        self.line(&format!("{} {}", self.theme.icons.success.green(), msg.green()));
    }

    fn warning(&self, msg: &str) {
        self.line(&format!("{} {}", self.theme.icons.warning.yellow(), msg.yellow()));
    }

    fn error(&self, msg: &str) {
        self.line(&format!("{} {}", self.theme.icons.error.red(), msg.red()));
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        if self.quiet {
            return;
        }
        let plural = if count == 1 { "" } else { "s" };
        self.line("");
        self.success(&format!("{count} package{plural} {action} in {elapsed_secs:.1}s"));

        // Machine-readable line for CI logs
        let result = serde_json::json!({
            "operation": action,
            "count": count,
            "elapsed": elapsed_secs,
        });
        self.line(&format!("RESULT {result}"));
    }
}
