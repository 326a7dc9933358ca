//! Image reference extraction and classification.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Url;

use super::codec::RichTextCodec;
use crate::util::is_http_url;

/// Where an embedded image currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// Scratch location with no note association yet.
    Cached,
    /// Durable file under `notes-images/<note_id>/`.
    LocalPersistent,
    /// HTTP(S) URL in cloud storage.
    Remote,
    /// Inline `data:` payload or any other non-file scheme. Never copied or deleted.
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub source: String,
    pub kind: ImageKind,
}

/// Pure lookups over a note body.
#[derive(Clone)]
pub struct ImageResolver {
    codec: Arc<dyn RichTextCodec>,
    images_root: PathBuf,
}

impl ImageResolver {
    pub fn new(codec: Arc<dyn RichTextCodec>, images_root: impl Into<PathBuf>) -> Self {
        Self {
            codec,
            images_root: images_root.into(),
        }
    }

    pub fn codec(&self) -> &dyn RichTextCodec {
        self.codec.as_ref()
    }

    pub fn classify(&self, source: &str) -> ImageKind {
        if is_http_url(source) {
            ImageKind::Remote
        } else if has_foreign_scheme(source) {
            ImageKind::Opaque
        } else if local_path(source).starts_with(&self.images_root) {
            ImageKind::LocalPersistent
        } else {
            ImageKind::Cached
        }
    }

    pub fn references(&self, text: &str) -> Vec<ImageRef> {
        self.codec
            .image_sources(text)
            .into_iter()
            .map(|source| {
                let kind = self.classify(&source);
                ImageRef { source, kind }
            })
            .collect()
    }

    pub fn list_cached(&self, text: &str) -> Vec<String> {
        self.list_kind(text, ImageKind::Cached)
    }

    pub fn list_local_persistent(&self, text: &str) -> Vec<String> {
        self.list_kind(text, ImageKind::LocalPersistent)
    }

    pub fn list_remote(&self, text: &str) -> Vec<String> {
        self.list_kind(text, ImageKind::Remote)
    }

    /// Every file or URL reference; with `only_local`, remote URLs are left out.
    pub fn list_all(&self, text: &str, only_local: bool) -> Vec<String> {
        self.references(text)
            .into_iter()
            .filter(|image| image.kind != ImageKind::Opaque)
            .filter(|image| !only_local || image.kind != ImageKind::Remote)
            .map(|image| image.source)
            .collect()
    }

    fn list_kind(&self, text: &str, kind: ImageKind) -> Vec<String> {
        self.references(text)
            .into_iter()
            .filter(|image| image.kind == kind)
            .map(|image| image.source)
            .collect()
    }
}

/// Parses as an absolute URL whose scheme is not `file`. Plain paths fail to parse.
fn has_foreign_scheme(source: &str) -> bool {
    Url::parse(source.trim()).is_ok_and(|url| url.scheme() != "file")
}

/// Filesystem path for a local reference, accepting `file://` URIs.
pub fn local_path(source: &str) -> PathBuf {
    let trimmed = source.trim();
    let stripped = trimmed.strip_prefix("file://").unwrap_or(trimmed);
    Path::new(stripped).to_path_buf()
}
