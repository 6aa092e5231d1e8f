//! Unpacking artifact archives into a staging directory.
//!
//! Formats are chosen from the file name (see [`ArchiveFormat`]). Entries that
//! would land outside the destination are rejected.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use lean_schema::ArchiveFormat;
use thiserror::Error;
use zip::ZipArchive;
use zstd::stream::Decoder as ZstdDecoder;

/// Failure while unpacking an archive.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Reading the archive or writing an entry failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The file extension is not a known archive format.
    #[error("not a supported archive: {0}")]
    UnsupportedFormat(String),

    /// The archive is malformed or an entry escapes the destination.
    #[error("corrupt archive: {0}")]
    Archive(String),
}

/// Reject absolute paths and `..` so entries cannot escape the destination.
fn sanitize(entry_path: &Path) -> Result<PathBuf, ExtractError> {
    let mut clean = PathBuf::new();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(ExtractError::Archive(format!(
                    "entry escapes archive: {}",
                    entry_path.display()
                )));
            }
        }
    }
    Ok(clean)
}

/// Returns the relative paths written.
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut extracted = Vec::new();

    for entry in tar::Archive::new(reader).entries()? {
        let mut entry = entry?;
        let relative = sanitize(&entry.path()?)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest_dir.join(&relative);

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
        extracted.push(relative);
    }

    Ok(extracted)
}

fn extract_tar_zst(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let reader = BufReader::new(File::open(archive_path)?);
    extract_tar(ZstdDecoder::new(reader)?, dest_dir)
}

fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let reader = BufReader::new(File::open(archive_path)?);
    extract_tar(flate2::read::GzDecoder::new(reader), dest_dir)
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)
        .map_err(|e| ExtractError::Archive(e.to_string()))?;

    fs::create_dir_all(dest_dir)?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ExtractError::Archive(format!("entry escapes archive: {}", entry.name())))?;

        let target = dest_dir.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        io::copy(&mut entry, &mut File::create(&target)?)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
        }

        extracted.push(relative);
    }

    Ok(extracted)
}

/// Extract `archive_path` into `dest_dir` according to its file name.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let file_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let format = ArchiveFormat::detect(&file_name)
        .ok_or_else(|| ExtractError::UnsupportedFormat(file_name.clone()))?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir),
        ArchiveFormat::Tar => extract_tar(BufReader::new(File::open(archive_path)?), dest_dir),
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest_dir),
        ArchiveFormat::TarZst => extract_tar_zst(archive_path, dest_dir),
    }
}

/// Lift the contents of `dir` one level when its only visible entry is a
/// directory (`zlib-1.3/include/...` becomes `include/...`).
///
/// Dot-files next to the wrapper are ignored and stay where they are.
pub fn strip_wrapper_dir(dir: &Path) -> io::Result<()> {
    let visible: Vec<_> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .collect();
    let [wrapper] = visible.as_slice() else {
        return Ok(());
    };
    if !wrapper.file_type()?.is_dir() {
        return Ok(());
    }

    // Park the wrapper first: a child may share its name.
    let parked = dir.join(format!(".unwrap-{}", wrapper.file_name().to_string_lossy()));
    fs::rename(wrapper.path(), &parked)?;
    for child in fs::read_dir(&parked)?.filter_map(Result::ok) {
        fs::rename(child.path(), dir.join(child.file_name()))?;
    }
    fs::remove_dir(parked)
}
