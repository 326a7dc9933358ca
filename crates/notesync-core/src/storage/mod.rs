//! Storage abstractions for image files: local filesystem, cloud objects, downloads.

mod http;
mod local;
mod r2;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::util::is_http_url;
use crate::Result;

pub use http::HttpImageDownloader;
pub use local::FsLocalStorage;
pub use r2::{R2Config, R2Storage};

/// Durable device-side file operations.
#[async_trait]
pub trait LocalFileStorage: Send + Sync {
    /// Copy `files[i]` to `directory/names[i]`, creating `directory` if needed.
    async fn copy_multiple_files(
        &self,
        directory: &Path,
        files: &[PathBuf],
        names: &[String],
    ) -> Result<Vec<PathBuf>>;

    /// Write `bytes` to `directory/name`, creating `directory` if needed.
    async fn write_file(&self, directory: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf>;

    /// Delete a file. A file that is already gone is not an error.
    async fn delete_file(&self, path: &Path) -> Result<()>;
}

/// Cloud object storage addressed by durable download URLs.
#[async_trait]
pub trait CloudFileStorage: Send + Sync {
    /// Upload each `(destination_path, file)` pair; returns one URL per pair, in order.
    async fn upload_multiple_files(&self, files: &[(String, PathBuf)]) -> Result<Vec<String>>;

    async fn delete_file_by_download_url(&self, url: &str) -> Result<()>;

    /// Whether `url` points into this storage (and may therefore be moved or deleted).
    fn owns_url(&self, url: &str) -> bool {
        is_http_url(url)
    }
}

/// Fetches remote image bytes.
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    /// `Ok(None)` when the server answers with a non-success status.
    async fn download(&self, url: &str) -> Result<Option<Vec<u8>>>;
}

pub(crate) fn sanitize_file_name(file_name: &str) -> String {
    let trimmed = file_name.trim().trim_matches('/');
    let trimmed = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if trimmed.is_empty() {
        return "file".to_string();
    }

    let (stem, ext) = trimmed
        .rsplit_once('.')
        .map_or((trimmed, ""), |parts| parts);
    let stem = sanitize_token(stem);
    let stem = if stem.is_empty() {
        "file".to_string()
    } else {
        stem
    };
    let ext = sanitize_token(ext);

    if ext.is_empty() {
        stem
    } else {
        format!("{stem}.{ext}")
    }
}

pub(crate) fn sanitize_token(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_dash = false;

    for ch in input.chars().flat_map(char::to_lowercase) {
        let keep = ch.is_ascii_alphanumeric();
        if keep {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }

    out.trim_matches('-').to_string()
}
