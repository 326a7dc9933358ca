//! Note model and write-side inputs

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::util::unix_timestamp_millis;

/// Identifier shared by the local and cloud copies of a note.
///
/// New ids are UUID v7 strings, but ids read back from a store are taken verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The reconciled note entity handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniversalNote {
    /// Identifier, stable across local and cloud copies
    pub note_id: NoteId,
    /// Serialized rich-text document
    pub text: String,
    /// Whether a mirrored cloud copy is kept consistent with this note
    pub is_sync_with_cloud: bool,
    /// Soft-trash flag
    pub is_trash: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Owner of the cloud copy, only set for cloud-linked notes
    pub owner_user_id: Option<String>,
}

impl UniversalNote {
    /// Build a note from a create input, stamping both timestamps with `now`.
    #[must_use]
    pub fn from_create(input: &CreateNoteInput, now: i64) -> Self {
        Self {
            note_id: input.note_id.clone(),
            text: input.text.clone(),
            is_sync_with_cloud: input.is_sync_with_cloud,
            is_trash: input.is_trash,
            created_at: now,
            updated_at: now,
            owner_user_id: input.owner_user_id.clone(),
        }
    }

    /// Apply an update input on top of this note, keeping `created_at`.
    #[must_use]
    pub fn with_update(&self, input: &UpdateNoteInput, now: i64) -> Self {
        Self {
            note_id: self.note_id.clone(),
            text: input.text.clone(),
            is_sync_with_cloud: input.is_sync_with_cloud,
            is_trash: input.is_trash,
            created_at: self.created_at,
            updated_at: now,
            owner_user_id: input.owner_user_id.clone(),
        }
    }
}

/// Input for creating a note. Timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNoteInput {
    pub note_id: NoteId,
    pub text: String,
    pub is_sync_with_cloud: bool,
    pub is_trash: bool,
    pub owner_user_id: Option<String>,
}

impl CreateNoteInput {
    /// A new local-only note with a fresh id.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            note_id: NoteId::new(),
            text: text.into(),
            is_sync_with_cloud: false,
            is_trash: false,
            owner_user_id: None,
        }
    }

    #[must_use]
    pub const fn synced(mut self, is_sync_with_cloud: bool) -> Self {
        self.is_sync_with_cloud = is_sync_with_cloud;
        self
    }

    #[must_use]
    pub fn into_note(self) -> UniversalNote {
        UniversalNote::from_create(&self, unix_timestamp_millis())
    }
}

impl From<&UniversalNote> for CreateNoteInput {
    fn from(note: &UniversalNote) -> Self {
        Self {
            note_id: note.note_id.clone(),
            text: note.text.clone(),
            is_sync_with_cloud: note.is_sync_with_cloud,
            is_trash: note.is_trash,
            owner_user_id: note.owner_user_id.clone(),
        }
    }
}

/// Input for updating a note. Setting `is_sync_with_cloud` to a value different from the
/// stored note requests a sync transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNoteInput {
    pub note_id: NoteId,
    pub text: String,
    pub is_sync_with_cloud: bool,
    pub is_trash: bool,
    pub owner_user_id: Option<String>,
}

impl From<&UniversalNote> for UpdateNoteInput {
    fn from(note: &UniversalNote) -> Self {
        Self {
            note_id: note.note_id.clone(),
            text: note.text.clone(),
            is_sync_with_cloud: note.is_sync_with_cloud,
            is_trash: note.is_trash,
            owner_user_id: note.owner_user_id.clone(),
        }
    }
}

impl From<UpdateNoteInput> for CreateNoteInput {
    fn from(input: UpdateNoteInput) -> Self {
        Self {
            note_id: input.note_id,
            text: input.text,
            is_sync_with_cloud: input.is_sync_with_cloud,
            is_trash: input.is_trash,
            owner_user_id: input.owner_user_id,
        }
    }
}
