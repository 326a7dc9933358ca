//! Reconciled view state exposed to observers.

use crate::error::{Error, ErrorKind};

use super::note::{NoteId, UniversalNote};

/// An error attached to the view state for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ViewError {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Snapshot of the notes the engine currently exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteViewState {
    pub notes: Vec<UniversalNote>,
    pub is_loading: bool,
    pub exception: Option<ViewError>,
    pub message: Option<String>,
}

impl NoteViewState {
    #[must_use]
    pub fn position(&self, note_id: &NoteId) -> Option<usize> {
        self.notes.iter().position(|note| &note.note_id == note_id)
    }

    #[must_use]
    pub fn find(&self, note_id: &NoteId) -> Option<&UniversalNote> {
        self.notes.iter().find(|note| &note.note_id == note_id)
    }

    /// Replace the note with the same id in place; returns false when absent.
    pub fn replace(&mut self, note: UniversalNote) -> bool {
        match self.position(&note.note_id) {
            Some(index) => {
                self.notes[index] = note;
                true
            }
            None => false,
        }
    }

    /// Append notes whose ids are not already present.
    pub fn append_unique(&mut self, notes: Vec<UniversalNote>) -> usize {
        let mut added = 0;
        for note in notes {
            if self.position(&note.note_id).is_none() {
                self.notes.push(note);
                added += 1;
            }
        }
        added
    }

    #[must_use]
    pub fn trashed(&self) -> Vec<UniversalNote> {
        self.notes.iter().filter(|note| note.is_trash).cloned().collect()
    }
}

/// Counts logged after each settled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSummary {
    pub note_count: usize,
    pub trashed: usize,
    pub synced: usize,
    pub is_loading: bool,
    pub has_error: bool,
}

impl From<&NoteViewState> for ViewSummary {
    fn from(state: &NoteViewState) -> Self {
        Self {
            note_count: state.notes.len(),
            trashed: state.notes.iter().filter(|note| note.is_trash).count(),
            synced: state
                .notes
                .iter()
                .filter(|note| note.is_sync_with_cloud)
                .count(),
            is_loading: state.is_loading,
            has_error: state.exception.is_some(),
        }
    }
}
