//! Append-only record of installed artifacts.
//!
//! One JSON object per line in `<cache>/download.log`.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::paths::PROVENANCE_LOG;

/// One line of the install log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    /// `name@version@toolchain` of the installed artifact.
    pub artifact: String,
    /// When the artifact reached its canonical directory.
    pub installed_at: DateTime<Utc>,
}

/// Location of the log inside `cache_dir`.
pub fn log_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(PROVENANCE_LOG)
}

/// Append one entry.
pub fn append(cache_dir: &Path, entry: &ProvenanceEntry) -> std::io::Result<()> {
    let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path(cache_dir))?;
    writeln!(file, "{line}")
}

/// Read every well-formed entry; malformed lines are skipped.
pub fn read_all(cache_dir: &Path) -> std::io::Result<Vec<ProvenanceEntry>> {
    let file = match std::fs::File::open(log_path(cache_dir)) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        if let Ok(entry) = serde_json::from_str(&line?) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ts;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        for (artifact, secs) in [("zlib@1.3@VS2019", 10), ("curl@8.0@VS2019", 20)] {
            append(
                dir.path(),
                &ProvenanceEntry {
                    artifact: artifact.to_string(),
                    installed_at: ts(secs),
                },
            )
            .unwrap();
        }
        std::fs::OpenOptions::new()
            .append(true)
            .open(log_path(dir.path()))
            .unwrap()
            .write_all(b"garbage\n")
            .unwrap();

        let entries = read_all(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].artifact, "curl@8.0@VS2019");

        let raw = std::fs::read_to_string(log_path(dir.path())).unwrap();
        assert!(raw.lines().next().unwrap().contains("\"artifact\":\"zlib@1.3@VS2019\""));
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(read_all(dir.path()).unwrap().is_empty());
    }
}
