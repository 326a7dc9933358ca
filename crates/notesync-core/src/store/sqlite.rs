//! `SQLite` implementation of `NoteStore`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::{migrations, page_window, NoteStore};
use crate::models::{CreateNoteInput, NoteId, UniversalNote, UpdateNoteInput};
use crate::util::unix_timestamp_millis;
use crate::{Error, Result};

const NOTE_COLUMNS: &str =
    "id, text, is_sync_with_cloud, is_trash, created_at, updated_at, owner_user_id";

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// Local note store on a single `SQLite` connection.
///
/// The connection is opened by `initialize` and dropped by `de_initialize`.
pub struct SqliteNoteStore {
    location: Location,
    conn: Mutex<Option<Connection>>,
}

impl SqliteNoteStore {
    /// Store backed by the database file at `path`, created if missing.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::with_location(Location::File(path.as_ref().to_path_buf()))
    }

    /// Store backed by a private in-memory database (useful for testing).
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_location(Location::Memory)
    }

    fn with_location(location: Location) -> Self {
        Self {
            location,
            conn: Mutex::new(None),
        }
    }

    fn connect(&self) -> Result<Connection> {
        let conn = match &self.location {
            Location::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
            Location::Memory => Connection::open_in_memory()?,
        };

        // WAL is unavailable for in-memory databases; ignore the pragma result there.
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        migrations::run(&conn)?;
        Ok(conn)
    }

    /// Run `f` against the open connection.
    async fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T> + Send) -> Result<T> {
        let guard = self.conn.lock().await;
        let conn = guard
            .as_ref()
            .ok_or_else(|| Error::Database("note store is not initialized".into()))?;
        f(conn)
    }

    /// Parse a note from a database row
    fn parse_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<UniversalNote> {
        let id: String = row.get(0)?;
        Ok(UniversalNote {
            note_id: NoteId::from(id),
            text: row.get(1)?,
            is_sync_with_cloud: row.get(2)?,
            is_trash: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            owner_user_id: row.get(6)?,
        })
    }

    fn get(conn: &Connection, note_id: &NoteId) -> Result<Option<UniversalNote>> {
        let note = conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?"),
                params![note_id.as_str()],
                Self::parse_note,
            )
            .optional()?;
        Ok(note)
    }

    fn insert(conn: &Connection, input: &CreateNoteInput, now: i64) -> Result<UniversalNote> {
        conn.execute(
            "INSERT INTO notes (id, text, is_sync_with_cloud, is_trash, created_at, updated_at, owner_user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                is_sync_with_cloud = excluded.is_sync_with_cloud,
                is_trash = excluded.is_trash,
                updated_at = excluded.updated_at,
                owner_user_id = excluded.owner_user_id",
            params![
                input.note_id.as_str(),
                input.text,
                input.is_sync_with_cloud,
                input.is_trash,
                now,
                input.owner_user_id,
            ],
        )?;

        Self::get(conn, &input.note_id)?.ok_or_else(|| Error::NotFound(input.note_id.to_string()))
    }

    fn update(conn: &Connection, input: &UpdateNoteInput, now: i64) -> Result<Option<UniversalNote>> {
        let rows = conn.execute(
            "UPDATE notes
             SET text = ?, is_sync_with_cloud = ?, is_trash = ?, updated_at = ?, owner_user_id = ?
             WHERE id = ?",
            params![
                input.text,
                input.is_sync_with_cloud,
                input.is_trash,
                now,
                input.owner_user_id,
                input.note_id.as_str(),
            ],
        )?;

        if rows == 0 {
            return Ok(None);
        }
        Self::get(conn, &input.note_id)
    }
}

/// Escape `LIKE` wildcards so the query matches literally.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl NoteStore for SqliteNoteStore {
    async fn initialize(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect()?);
            tracing::debug!("Opened note store {:?}", self.location);
        }
        Ok(())
    }

    async fn de_initialize(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, error)| Error::Sqlite(error))?;
            tracing::debug!("Closed note store {:?}", self.location);
        }
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    async fn get_all_notes(&self, limit: i64, page: usize) -> Result<Vec<UniversalNote>> {
        let Some((limit, offset)) = page_window(limit, page) else {
            return Ok(Vec::new());
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLUMNS}
                 FROM notes
                 ORDER BY updated_at DESC, id DESC
                 LIMIT ? OFFSET ?"
            ))?;
            let notes = stmt
                .query_map(params![limit, offset], Self::parse_note)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(notes)
        })
        .await
    }

    async fn get_note_by_id(&self, note_id: &NoteId) -> Result<Option<UniversalNote>> {
        self.with_conn(|conn| Self::get(conn, note_id)).await
    }

    async fn search_all_notes(&self, query: &str) -> Result<Vec<UniversalNote>> {
        let query = query.trim();
        if query.is_empty() {
            return self.get_all_notes(super::UNBOUNDED, 0).await;
        }

        let pattern = like_pattern(query);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLUMNS}
                 FROM notes
                 WHERE text LIKE ? ESCAPE '\\'
                 ORDER BY updated_at DESC, id DESC"
            ))?;
            let notes = stmt
                .query_map(params![pattern], Self::parse_note)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(notes)
        })
        .await
    }

    async fn insert_note(&self, input: &CreateNoteInput) -> Result<UniversalNote> {
        let now = unix_timestamp_millis();
        self.with_conn(|conn| Self::insert(conn, input, now)).await
    }

    async fn insert_notes(&self, inputs: &[CreateNoteInput]) -> Result<Vec<UniversalNote>> {
        let now = unix_timestamp_millis();
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let notes = inputs
                .iter()
                .map(|input| Self::insert(&tx, input, now))
                .collect::<Result<Vec<_>>>()?;
            tx.commit()?;
            Ok(notes)
        })
        .await
    }

    async fn update_note(&self, input: &UpdateNoteInput) -> Result<UniversalNote> {
        let now = unix_timestamp_millis();
        self.with_conn(|conn| {
            Self::update(conn, input, now)?.ok_or_else(|| Error::NotFound(input.note_id.to_string()))
        })
        .await
    }

    async fn update_notes_by_ids(&self, inputs: &[UpdateNoteInput]) -> Result<Vec<UniversalNote>> {
        let now = unix_timestamp_millis();
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut notes = Vec::with_capacity(inputs.len());
            for input in inputs {
                if let Some(note) = Self::update(&tx, input, now)? {
                    notes.push(note);
                }
            }
            tx.commit()?;
            Ok(notes)
        })
        .await
    }

    async fn delete_note_by_id(&self, note_id: &NoteId) -> Result<()> {
        self.with_conn(|conn| {
            let rows = conn.execute("DELETE FROM notes WHERE id = ?", params![note_id.as_str()])?;
            if rows == 0 {
                return Err(Error::NotFound(note_id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn delete_notes_by_ids(&self, note_ids: &[NoteId]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare("DELETE FROM notes WHERE id = ?")?;
                for note_id in note_ids {
                    stmt.execute(params![note_id.as_str()])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_all_notes(&self) -> Result<()> {
        self.with_conn(|conn| {
            let rows = conn.execute("DELETE FROM notes", [])?;
            tracing::debug!("Deleted {} notes", rows);
            Ok(())
        })
        .await
    }
}
