//! In-process `NoteStore`, used as the cloud stand-in and in tests.

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{page_window, NoteStore};
use crate::models::{CreateNoteInput, NoteId, UniversalNote, UpdateNoteInput};
use crate::util::unix_timestamp_millis;
use crate::{Error, Result};

#[derive(Default)]
struct Inner {
    initialized: bool,
    notes: HashMap<NoteId, UniversalNote>,
}

impl Inner {
    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::Database("note store is not initialized".into()))
        }
    }

    fn sorted(&self) -> Vec<UniversalNote> {
        let mut notes: Vec<UniversalNote> = self.notes.values().cloned().collect();
        notes.sort_by_key(|note| Reverse((note.updated_at, note.note_id.as_str().to_owned())));
        notes
    }

    fn insert(&mut self, input: &CreateNoteInput, now: i64) -> UniversalNote {
        let created_at = self
            .notes
            .get(&input.note_id)
            .map_or(now, |existing| existing.created_at);
        let note = UniversalNote {
            created_at,
            ..UniversalNote::from_create(input, now)
        };
        self.notes.insert(note.note_id.clone(), note.clone());
        note
    }

    fn update(&mut self, input: &UpdateNoteInput, now: i64) -> Option<UniversalNote> {
        let existing = self.notes.get_mut(&input.note_id)?;
        *existing = existing.with_update(input, now);
        Some(existing.clone())
    }
}

/// Notes kept in a map behind an async lock. Data does not survive `de_initialize`.
#[derive(Default)]
pub struct MemoryNoteStore {
    inner: RwLock<Inner>,
}

impl MemoryNoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that is already initialized.
    #[must_use]
    pub fn initialized() -> Self {
        Self {
            inner: RwLock::new(Inner {
                initialized: true,
                notes: HashMap::new(),
            }),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.notes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn initialize(&self) -> Result<()> {
        self.inner.write().await.initialized = true;
        Ok(())
    }

    async fn de_initialize(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.initialized = false;
        inner.notes.clear();
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        self.inner.read().await.initialized
    }

    async fn get_all_notes(&self, limit: i64, page: usize) -> Result<Vec<UniversalNote>> {
        let inner = self.inner.read().await;
        inner.ensure_initialized()?;
        let Some((limit, offset)) = page_window(limit, page) else {
            return Ok(Vec::new());
        };

        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(inner.sorted().into_iter().skip(skip).take(take).collect())
    }

    async fn get_note_by_id(&self, note_id: &NoteId) -> Result<Option<UniversalNote>> {
        let inner = self.inner.read().await;
        inner.ensure_initialized()?;
        Ok(inner.notes.get(note_id).cloned())
    }

    async fn search_all_notes(&self, query: &str) -> Result<Vec<UniversalNote>> {
        let inner = self.inner.read().await;
        inner.ensure_initialized()?;
        let needle = query.trim().to_ascii_lowercase();
        Ok(inner
            .sorted()
            .into_iter()
            .filter(|note| note.text.to_ascii_lowercase().contains(&needle))
            .collect())
    }

    async fn insert_note(&self, input: &CreateNoteInput) -> Result<UniversalNote> {
        let mut inner = self.inner.write().await;
        inner.ensure_initialized()?;
        Ok(inner.insert(input, unix_timestamp_millis()))
    }

    async fn insert_notes(&self, inputs: &[CreateNoteInput]) -> Result<Vec<UniversalNote>> {
        let mut inner = self.inner.write().await;
        inner.ensure_initialized()?;
        let now = unix_timestamp_millis();
        Ok(inputs.iter().map(|input| inner.insert(input, now)).collect())
    }

    async fn update_note(&self, input: &UpdateNoteInput) -> Result<UniversalNote> {
        let mut inner = self.inner.write().await;
        inner.ensure_initialized()?;
        inner
            .update(input, unix_timestamp_millis())
            .ok_or_else(|| Error::NotFound(input.note_id.to_string()))
    }

    async fn update_notes_by_ids(&self, inputs: &[UpdateNoteInput]) -> Result<Vec<UniversalNote>> {
        let mut inner = self.inner.write().await;
        inner.ensure_initialized()?;
        let now = unix_timestamp_millis();
        Ok(inputs
            .iter()
            .filter_map(|input| inner.update(input, now))
            .collect())
    }

    async fn delete_note_by_id(&self, note_id: &NoteId) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_initialized()?;
        inner
            .notes
            .remove(note_id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(note_id.to_string()))
    }

    async fn delete_notes_by_ids(&self, note_ids: &[NoteId]) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_initialized()?;
        for note_id in note_ids {
            inner.notes.remove(note_id);
        }
        Ok(())
    }

    async fn delete_all_notes(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_initialized()?;
        inner.notes.clear();
        Ok(())
    }
}
