//! Data models for notesync

mod note;
mod view_state;

pub use note::{CreateNoteInput, NoteId, UniversalNote, UpdateNoteInput};
pub use view_state::{NoteViewState, ViewError, ViewSummary};
