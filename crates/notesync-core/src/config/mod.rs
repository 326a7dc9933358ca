//! Engine configuration.
//!
//! Provides `EngineConfig`, the filesystem layout and pagination settings shared
//! by the image layer and the synchronization engine.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::util::normalize_text_option;
use crate::{Error, NoteId, Result};

const ENV_DOCUMENTS_DIR: &str = "NOTESYNC_DOCUMENTS_DIR";
const ENV_PAGE_SIZE: &str = "NOTESYNC_PAGE_SIZE";

/// Directory under the documents dir holding per-note image folders.
pub const NOTES_IMAGES_DIR: &str = "notes-images";

/// Default number of notes fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Durable app documents directory.
    pub documents_dir: PathBuf,
    /// Notes per page for `load_more`.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            documents_dir: env::temp_dir().join("notesync"),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn new(documents_dir: impl Into<PathBuf>) -> Self {
        Self {
            documents_dir: documents_dir.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// `NOTESYNC_DOCUMENTS_DIR` is required; `NOTESYNC_PAGE_SIZE` is optional.
    pub fn from_env() -> Result<Self> {
        parse_config(|key| env::var(key).ok())
    }

    /// `<documents>/notes-images`
    #[must_use]
    pub fn images_root(&self) -> PathBuf {
        self.documents_dir.join(NOTES_IMAGES_DIR)
    }

    /// `<documents>/notes-images/<note_id>`
    #[must_use]
    pub fn note_images_dir(&self, note_id: &NoteId) -> PathBuf {
        self.images_root().join(note_id.as_str())
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<EngineConfig> {
    let documents_dir = normalize_text_option(lookup(ENV_DOCUMENTS_DIR)).ok_or_else(|| {
        Error::InvalidInput(format!("{ENV_DOCUMENTS_DIR} must be set"))
    })?;

    let page_size = match normalize_text_option(lookup(ENV_PAGE_SIZE)) {
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|size| *size > 0)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "{ENV_PAGE_SIZE} must be a positive integer, got '{raw}'"
                ))
            })?,
        None => DEFAULT_PAGE_SIZE,
    };

    Ok(EngineConfig {
        documents_dir: PathBuf::from(documents_dir),
        page_size,
    })
}
