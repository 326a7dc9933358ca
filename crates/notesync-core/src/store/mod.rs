//! Note persistence contract shared by the local and the cloud store.

mod memory;
mod migrations;
mod sqlite;

use async_trait::async_trait;

use crate::models::{CreateNoteInput, NoteId, UniversalNote, UpdateNoteInput};
use crate::Result;

pub use memory::MemoryNoteStore;
pub use sqlite::SqliteNoteStore;

/// `limit` value meaning "no limit".
pub const UNBOUNDED: i64 = -1;

/// CRUD, search and pagination over one note collection.
///
/// Stores assign `created_at`/`updated_at`. Inserting an id that already exists replaces the
/// note's content and keeps its `created_at`.
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    async fn de_initialize(&self) -> Result<()>;

    async fn is_initialized(&self) -> bool;

    /// Page `page` of `limit` notes, most recently updated first. A negative `limit` returns
    /// every note on page 0 and nothing after it.
    async fn get_all_notes(&self, limit: i64, page: usize) -> Result<Vec<UniversalNote>>;

    async fn get_note_by_id(&self, note_id: &NoteId) -> Result<Option<UniversalNote>>;

    /// Substring match on the note text, case-insensitive for ASCII letters only (the folding
    /// `SQLite` `LIKE` applies). A blank query matches everything.
    async fn search_all_notes(&self, query: &str) -> Result<Vec<UniversalNote>>;

    async fn insert_note(&self, input: &CreateNoteInput) -> Result<UniversalNote>;

    async fn insert_notes(&self, inputs: &[CreateNoteInput]) -> Result<Vec<UniversalNote>>;

    /// Fails with `Error::NotFound` when the note does not exist.
    async fn update_note(&self, input: &UpdateNoteInput) -> Result<UniversalNote>;

    /// Updates the notes that exist and skips the rest.
    async fn update_notes_by_ids(&self, inputs: &[UpdateNoteInput]) -> Result<Vec<UniversalNote>>;

    /// Fails with `Error::NotFound` when the note does not exist.
    async fn delete_note_by_id(&self, note_id: &NoteId) -> Result<()>;

    /// Deletes the notes that exist and skips the rest.
    async fn delete_notes_by_ids(&self, note_ids: &[NoteId]) -> Result<()>;

    async fn delete_all_notes(&self) -> Result<()>;
}

/// Offset of `page` for a bounded `limit`, or `None` when the page is past an unbounded read.
pub(crate) fn page_window(limit: i64, page: usize) -> Option<(i64, i64)> {
    if limit < 0 {
        return (page == 0).then_some((UNBOUNDED, 0));
    }
    let page = i64::try_from(page).ok()?;
    Some((limit, limit.checked_mul(page)?))
}
