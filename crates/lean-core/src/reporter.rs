//! Progress sink for engine operations.
//!
//! The engine never prints. Resolution, install and placement steps call into a
//! [`Reporter`]; the CLI supplies a terminal implementation and tests record the
//! calls.

use lean_schema::ArtifactIdentity;

/// Receives progress events; implementations decide how to show them.
pub trait Reporter: Send + Sync {
    /// A new phase started ("Resolving", "Fetching", "Placing").
    fn section(&self, title: &str);

    /// `current` bytes of the archive for `id` have arrived.
    fn downloading(&self, id: &ArtifactIdentity, current: u64, total: Option<u64>);

    /// The archive for `id` is being unpacked into staging.
    fn extracting(&self, id: &ArtifactIdentity);

    /// `id` is in its canonical cache directory.
    fn done(&self, id: &ArtifactIdentity, detail: &str, size: Option<u64>);

    /// Installing `id` failed; the run continues with the next artifact.
    fn failed(&self, id: &ArtifactIdentity, reason: &str);

    /// Neutral status text.
    fn info(&self, msg: &str);

    /// A step finished well.
    fn success(&self, msg: &str);

    /// Something was skipped or relaxed, e.g. a toolchain fallback.
    fn warning(&self, msg: &str);

    /// A per-item failure such as an unresolved requirement.
    fn error(&self, msg: &str);

    /// End of a run: `count` artifacts `action` in `elapsed_secs`.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

/// Discards everything. Used where only the return value matters.
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn downloading(&self, _: &ArtifactIdentity, _: u64, _: Option<u64>) {}
    fn extracting(&self, _: &ArtifactIdentity) {}
    fn done(&self, _: &ArtifactIdentity, _: &str, _: Option<u64>) {}
    fn failed(&self, _: &ArtifactIdentity, _: &str) {}
    fn info(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}
