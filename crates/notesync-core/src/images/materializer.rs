//! Persisting, migrating, and deleting the images a note owns.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Url;
use uuid::Uuid;

use super::resolver::{local_path, ImageResolver};
use crate::auth::AuthProvider;
use crate::config::EngineConfig;
use crate::storage::{
    sanitize_file_name, sanitize_token, CloudFileStorage, ImageDownloader, LocalFileStorage,
};
use crate::{Error, NoteId, Result};

/// Prefix for every generated image file name.
pub const IMAGE_NAME_PREFIX: &str = "note-image-";

/// Which side of the sync boundary an image lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLocation {
    Local,
    Cloud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    LocalToCloud,
    CloudToLocal,
}

/// Cloud object path for a note image: `/users/<user_id>/<note_id>/<file_name>`.
#[must_use]
pub fn cloud_object_path(user_id: &str, note_id: &NoteId, file_name: &str) -> String {
    format!("/users/{user_id}/{note_id}/{file_name}")
}

/// Fresh `note-image-<uuid>[.ext]` name, keeping the source's extension.
#[must_use]
pub fn generated_image_name(source: &str) -> String {
    let id = Uuid::now_v7().simple();
    let extension = local_path(source)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(sanitize_token)
        .filter(|ext| !ext.is_empty());

    match extension {
        Some(ext) => format!("{IMAGE_NAME_PREFIX}{id}.{ext}"),
        None => format!("{IMAGE_NAME_PREFIX}{id}"),
    }
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(sanitize_file_name)
}

fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.rev().find(|segment| !segment.is_empty())?;
    let decoded = urlencoding::decode(segment).ok()?;
    Some(sanitize_file_name(&decoded))
}

/// Moves image files between scratch, device, and cloud, rewriting note bodies to match.
#[derive(Clone)]
pub struct ImageMaterializer {
    resolver: ImageResolver,
    config: EngineConfig,
    local: Arc<dyn LocalFileStorage>,
    cloud: Arc<dyn CloudFileStorage>,
    downloader: Arc<dyn ImageDownloader>,
    auth: Arc<dyn AuthProvider>,
}

impl ImageMaterializer {
    pub fn new(
        resolver: ImageResolver,
        config: EngineConfig,
        local: Arc<dyn LocalFileStorage>,
        cloud: Arc<dyn CloudFileStorage>,
        downloader: Arc<dyn ImageDownloader>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            resolver,
            config,
            local,
            cloud,
            downloader,
            auth,
        }
    }

    pub const fn resolver(&self) -> &ImageResolver {
        &self.resolver
    }

    /// Persist every cached image in `text` for `note_id` and return the rewritten text.
    ///
    /// All-or-nothing: the first failed copy/upload is returned and `text` is not rewritten.
    pub async fn persist_cached_images(
        &self,
        text: &str,
        note_id: &NoteId,
        target_is_cloud: bool,
    ) -> Result<String> {
        let cached = self.resolver.list_cached(text);
        if cached.is_empty() {
            return Ok(text.to_string());
        }

        let names: Vec<String> = cached
            .iter()
            .map(|source| generated_image_name(source))
            .collect();
        let files: Vec<PathBuf> = cached.iter().map(|source| local_path(source)).collect();

        let persisted = if target_is_cloud {
            let user = self.auth.require_current_user()?;
            let uploads: Vec<(String, PathBuf)> = names
                .iter()
                .zip(files)
                .map(|(name, file)| (cloud_object_path(&user.id, note_id, name), file))
                .collect();
            self.cloud.upload_multiple_files(&uploads).await?
        } else {
            let directory = self.config.note_images_dir(note_id);
            self.local
                .copy_multiple_files(&directory, &files, &names)
                .await?
                .into_iter()
                .map(|path| path.to_string_lossy().into_owned())
                .collect()
        };

        if persisted.len() != cached.len() {
            return Err(Error::Storage(format!(
                "persisted {} of {} images for note {note_id}",
                persisted.len(),
                cached.len()
            )));
        }

        let rewritten = self.rewrite(text, &cached, &persisted)?;
        tracing::debug!(
            "Persisted {} cached images for note {} ({})",
            cached.len(),
            note_id,
            if target_is_cloud { "cloud" } else { "local" }
        );
        Ok(rewritten)
    }

    /// Move already-persisted images across the sync boundary.
    ///
    /// Originals are removed only once every new copy is written; failing to remove an
    /// original is logged and does not undo the migration.
    pub async fn migrate_images(
        &self,
        text: &str,
        note_id: &NoteId,
        direction: MigrationDirection,
    ) -> Result<String> {
        match direction {
            MigrationDirection::LocalToCloud => self.migrate_local_to_cloud(text, note_id).await,
            MigrationDirection::CloudToLocal => self.migrate_cloud_to_local(text, note_id).await,
        }
    }

    async fn migrate_local_to_cloud(&self, text: &str, note_id: &NoteId) -> Result<String> {
        let sources = self.resolver.list_local_persistent(text);
        if sources.is_empty() {
            return Ok(text.to_string());
        }

        let user = self.auth.require_current_user()?;
        let uploads: Vec<(String, PathBuf)> = sources
            .iter()
            .map(|source| {
                let path = local_path(source);
                let name = file_name_of(&path).unwrap_or_else(|| generated_image_name(source));
                (cloud_object_path(&user.id, note_id, &name), path)
            })
            .collect();

        let urls = self.cloud.upload_multiple_files(&uploads).await?;
        if urls.len() != sources.len() {
            return Err(Error::Storage(format!(
                "uploaded {} of {} images for note {note_id}",
                urls.len(),
                sources.len()
            )));
        }
        let rewritten = self.rewrite(text, &sources, &urls)?;

        for (_, path) in &uploads {
            if let Err(error) = self.local.delete_file(path).await {
                tracing::warn!("Failed to remove migrated image {}: {}", path.display(), error);
            }
        }

        tracing::info!("Moved {} images of note {} to cloud", sources.len(), note_id);
        Ok(rewritten)
    }

    async fn migrate_cloud_to_local(&self, text: &str, note_id: &NoteId) -> Result<String> {
        let sources: Vec<String> = self
            .resolver
            .list_remote(text)
            .into_iter()
            .filter(|url| self.cloud.owns_url(url))
            .collect();
        if sources.is_empty() {
            return Ok(text.to_string());
        }

        let directory = self.config.note_images_dir(note_id);
        let codec = self.resolver.codec();
        let mut rewritten = text.to_string();
        let mut migrated: Vec<&str> = Vec::new();

        for url in &sources {
            let Some(bytes) = self.downloader.download(url).await? else {
                tracing::warn!("Dropping unreachable image {} from note {}", url, note_id);
                rewritten = codec.remove_image(&rewritten, url)?;
                continue;
            };

            let name = file_name_from_url(url).unwrap_or_else(|| generated_image_name(url));
            let path = self.local.write_file(&directory, &name, &bytes).await?;
            rewritten = codec.replace_first_image(&rewritten, url, &path.to_string_lossy())?;
            migrated.push(url);
        }

        let mut seen = HashSet::new();
        for url in migrated.into_iter().filter(|url| seen.insert(*url)) {
            if let Err(error) = self.cloud.delete_file_by_download_url(url).await {
                tracing::warn!("Failed to remove migrated cloud image {}: {}", url, error);
            }
        }

        tracing::info!("Moved images of note {} to local storage", note_id);
        Ok(rewritten)
    }

    /// Delete every owned image referenced by `text` at `location`.
    pub async fn delete_all_images(&self, text: &str, location: ImageLocation) -> Result<()> {
        match location {
            ImageLocation::Local => {
                for source in self.resolver.list_local_persistent(text) {
                    self.local.delete_file(&local_path(&source)).await?;
                }
            }
            ImageLocation::Cloud => {
                let mut seen = HashSet::new();
                for url in self.resolver.list_remote(text) {
                    if self.cloud.owns_url(&url) && seen.insert(url.clone()) {
                        self.cloud.delete_file_by_download_url(&url).await?;
                    }
                }
            }
        }
        Ok(())
    }

    fn rewrite(&self, text: &str, from: &[String], to: &[String]) -> Result<String> {
        let codec = self.resolver.codec();
        from.iter()
            .zip(to)
            .try_fold(text.to_string(), |current, (old, new)| {
                codec.replace_first_image(&current, old, new)
            })
    }
}
