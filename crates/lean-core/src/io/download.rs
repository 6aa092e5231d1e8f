//! Download module with progress reporting
//!
//! Archives are pulled through [`RemoteRepository::read_range`] in fixed-size
//! chunks so progress can be reported as bytes arrive.

use std::path::Path;

use lean_schema::ArtifactIdentity;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::remote::{RemoteError, RemoteRepository};
use crate::reporter::Reporter;

/// Bytes requested per ranged read.
pub const CHUNK_SIZE: u64 = 1024 * 1024;

/// Failure while copying an archive out of the remote.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The remote refused a stat or read.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Writing the local file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes arrived than the remote advertised.
    #[error("Transfer ended early: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Size reported by the remote.
        expected: u64,
        /// Bytes actually written.
        actual: u64,
    },
}

/// Copy `remote_path` to `dest`, reporting progress against `id`.
///
/// Returns the number of bytes written. A partial file is removed on failure.
pub async fn download_artifact(
    remote: &dyn RemoteRepository,
    remote_path: &str,
    dest: &Path,
    id: &ArtifactIdentity,
    reporter: &dyn Reporter,
) -> Result<u64, DownloadError> {
    let result = transfer(remote, remote_path, dest, id, reporter).await;
    if result.is_err() {
        tokio::fs::remove_file(dest).await.ok();
    }
    result
}

async fn transfer(
    remote: &dyn RemoteRepository,
    remote_path: &str,
    dest: &Path,
    id: &ArtifactIdentity,
    reporter: &dyn Reporter,
) -> Result<u64, DownloadError> {
    let total = remote.file_size(remote_path).await?;
    reporter.downloading(id, 0, Some(total));

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = File::create(dest).await?;
    let mut downloaded: u64 = 0;

    while downloaded < total {
        let len = CHUNK_SIZE.min(total - downloaded);
        let chunk = remote.read_range(remote_path, downloaded, len).await?;
        if chunk.is_empty() {
            return Err(DownloadError::Truncated {
                expected: total,
                actual: downloaded,
            });
        }
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        reporter.downloading(id, downloaded, Some(total));
    }

    file.flush().await?;
    Ok(downloaded)
}
