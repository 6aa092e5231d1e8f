//! In-memory fixtures shared by unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lean_schema::ArtifactIdentity;

use crate::remote::{RemoteError, RemoteFile, RemoteRepository};
use crate::reporter::Reporter;

/// A remote repository backed by a map of path to (bytes, mtime).
#[derive(Debug, Default)]
pub struct MemoryRepository {
    files: Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
    pub reads: Mutex<Vec<String>>,
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, data: impl Into<Vec<u8>>, modified: DateTime<Utc>) -> Self {
        self.put(path, data, modified);
        self
    }

    pub fn put(&self, path: &str, data: impl Into<Vec<u8>>, modified: DateTime<Utc>) {
        self.files
            .lock()
            .unwrap()
            .insert(path.trim_start_matches('/').to_string(), (data.into(), modified));
    }

    pub fn read_log(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }
}

fn prefix(dir: &str) -> String {
    let trimmed = dir.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

#[async_trait]
impl RemoteRepository for MemoryRepository {
    fn describe(&self) -> String {
        "memory://".to_string()
    }

    async fn list_dirs(&self, dir: &str) -> Result<Vec<String>, RemoteError> {
        let prefix = prefix(dir);
        let files = self.files.lock().unwrap();
        let mut dirs: Vec<String> = files
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|rest| rest.split_once('/').map(|(d, _)| d.to_string()))
            .collect();
        dirs.sort();
        dirs.dedup();
        Ok(dirs)
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<RemoteFile>, RemoteError> {
        let prefix = prefix(dir);
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, (data, modified))| RemoteFile {
                path: k.clone(),
                size: data.len() as u64,
                modified: *modified,
            })
            .collect())
    }

    async fn file_size(&self, path: &str) -> Result<u64, RemoteError> {
        let files = self.files.lock().unwrap();
        files
            .get(path.trim_start_matches('/'))
            .map(|(data, _)| data.len() as u64)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    async fn read_range(&self, path: &str, offset: u64, len: u64) -> Result<Vec<u8>, RemoteError> {
        let files = self.files.lock().unwrap();
        let (data, _) = files
            .get(path.trim_start_matches('/'))
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        let start = (offset as usize).min(data.len());
        let end = ((offset + len) as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    async fn read_optional(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        self.reads.lock().unwrap().push(path.to_string());
        let files = self.files.lock().unwrap();
        Ok(files
            .get(path.trim_start_matches('/'))
            .map(|(data, _)| data.clone()))
    }
}

/// Reporter that records warnings and failures for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub warnings: Mutex<Vec<String>>,
    pub failures: Mutex<Vec<String>>,
    pub done: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn section(&self, _: &str) {}
    fn downloading(&self, _: &ArtifactIdentity, _: u64, _: Option<u64>) {}
    fn extracting(&self, _: &ArtifactIdentity) {}
    fn done(&self, id: &ArtifactIdentity, _: &str, _: Option<u64>) {
        self.done.lock().unwrap().push(id.to_string());
    }
    fn failed(&self, id: &ArtifactIdentity, reason: &str) {
        self.failures.lock().unwrap().push(format!("{id}: {reason}"));
    }
    fn info(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warning(&self, msg: &str) {
        self.warnings.lock().unwrap().push(msg.to_string());
    }
    fn error(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}

/// Build a zip archive in memory with the given `(path, contents)` entries.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;

    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default();
        for (path, contents) in entries {
            writer.start_file(*path, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    buf.into_inner()
}
