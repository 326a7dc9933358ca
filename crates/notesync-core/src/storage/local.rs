//! Filesystem-backed local image storage.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{sanitize_file_name, LocalFileStorage};
use crate::{Error, Result};

/// Stores images with `tokio::fs` under whatever directory the caller picks.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLocalStorage;

impl FsLocalStorage {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LocalFileStorage for FsLocalStorage {
    async fn copy_multiple_files(
        &self,
        directory: &Path,
        files: &[PathBuf],
        names: &[String],
    ) -> Result<Vec<PathBuf>> {
        if files.len() != names.len() {
            return Err(Error::InvalidInput(format!(
                "copy needs one name per file ({} files, {} names)",
                files.len(),
                names.len()
            )));
        }

        fs::create_dir_all(directory).await?;
        let mut copied = Vec::with_capacity(files.len());
        for (file, name) in files.iter().zip(names) {
            let target = directory.join(sanitize_file_name(name));
            fs::copy(file, &target).await.map_err(|error| {
                Error::Storage(format!(
                    "copy {} -> {} failed: {error}",
                    file.display(),
                    target.display()
                ))
            })?;
            tracing::debug!("Copied image {} to {}", file.display(), target.display());
            copied.push(target);
        }

        Ok(copied)
    }

    async fn write_file(&self, directory: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(directory).await?;
        let target = directory.join(sanitize_file_name(name));
        fs::write(&target, bytes).await?;
        Ok(target)
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!("Deleted image {}", path.display());
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}
