//! Tarball download and in-memory extraction.

use super::error::PkgError;
use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::Client;
use std::io::Read;
use std::path::Component;
use std::time::Duration;
use tar::Archive;

/// Maximum tarball size (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

/// Maximum total size of the files unpacked from one tarball (512 MB).
pub const MAX_UNPACKED_SIZE: u64 = 512 * 1024 * 1024;

/// Download timeout in seconds.
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// One file unpacked from a package archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    /// `/`-separated path relative to the package root.
    pub path: String,
    /// Raw file contents.
    pub contents: Vec<u8>,
}

impl VirtualFile {
    #[must_use]
    pub fn new(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    /// Contents as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents).into_owned()
    }
}

/// Download a tarball from a URL.
///
/// # Errors
/// Returns an error if the download fails or exceeds the size limit.
pub async fn download_tarball(client: &Client, url: &str, max_bytes: u64) -> Result<Bytes, PkgError> {
    let response = client
        .get(url)
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .send()
        .await
        .map_err(|e| PkgError::download_failed(format!("Failed to download '{url}': {e}")))?;

    if !response.status().is_success() {
        return Err(PkgError::download_failed(format!(
            "Download failed with status {} for '{url}'",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(PkgError::download_failed(format!(
                "Tarball too large: {len} bytes (max: {max_bytes})"
            )));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PkgError::download_failed(format!("Failed to read response body: {e}")))?;

    if bytes.len() as u64 > max_bytes {
        return Err(PkgError::download_failed(format!(
            "Tarball too large: {} bytes (max: {max_bytes})",
            bytes.len()
        )));
    }

    Ok(bytes)
}

/// Unpack a gzipped tarball into a flat list of files.
///
/// npm archives wrap everything in a single root directory, usually
/// `package/` but sometimes the bare package name (`@types/*`). That root is
/// stripped so paths are relative to the package. Directories, symlinks and
/// other special entries are skipped.
///
/// # Errors
/// Returns an error if the archive is corrupt, contains absolute or
/// traversing paths, or unpacks to more than [`MAX_UNPACKED_SIZE`].
pub fn extract_tgz_entries(bytes: &[u8]) -> Result<Vec<VirtualFile>, PkgError> {
    extract_tgz_entries_limited(bytes, MAX_UNPACKED_SIZE)
}

/// [`extract_tgz_entries`] with an explicit cap on the unpacked file bytes.
///
/// # Errors
/// Same as [`extract_tgz_entries`], failing once the files' total size
/// exceeds `max_bytes`.
pub fn extract_tgz_entries_limited(
    bytes: &[u8],
    max_bytes: u64,
) -> Result<Vec<VirtualFile>, PkgError> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut files = Vec::new();
    let mut unpacked: u64 = 0;

    for entry in archive
        .entries()
        .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entries: {e}")))?
    {
        let mut entry = entry
            .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entry: {e}")))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| PkgError::extract_failed(format!("Failed to read entry path: {e}")))?
            .into_owned();
        let path_str = path.to_string_lossy().replace('\\', "/");

        if path.is_absolute() || path_str.starts_with('/') {
            return Err(PkgError::extract_failed(format!(
                "Tarball contains absolute path: {path_str}"
            )));
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PkgError::extract_failed(format!(
                "Tarball contains path traversal: {path_str}"
            )));
        }

        let size = entry
            .header()
            .size()
            .map_err(|e| PkgError::extract_failed(format!("Failed to read size of {path_str}: {e}")))?;
        unpacked = unpacked.saturating_add(size);
        if unpacked > max_bytes {
            return Err(PkgError::extract_failed(format!(
                "Tarball unpacks to more than {max_bytes} bytes"
            )));
        }

        let mut contents = Vec::new();
        entry
            .by_ref()
            .take(size)
            .read_to_end(&mut contents)
            .map_err(|e| PkgError::extract_failed(format!("Failed to read {path_str}: {e}")))?;

        files.push(VirtualFile::new(path_str, contents));
    }

    strip_archive_root(&mut files);
    Ok(files)
}

/// Remove the shared top-level directory from every path, if there is one.
fn strip_archive_root(files: &mut [VirtualFile]) {
    let Some(first) = files.first() else {
        return;
    };
    let Some((root, _)) = first.path.split_once('/') else {
        return;
    };
    let prefix = format!("{root}/");

    if files.iter().all(|f| f.path.starts_with(&prefix)) {
        for file in files.iter_mut() {
            file.path = file.path[prefix.len()..].to_string();
        }
    }
}
