//! In-crate fakes for collaborator traits.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::{CreateNoteInput, NoteId, UniversalNote, UpdateNoteInput};
use crate::sink::ErrorSink;
use crate::storage::{CloudFileStorage, ImageDownloader};
use crate::store::{MemoryNoteStore, NoteStore};
use crate::{Error, Result};

/// Object storage kept in a map; also serves downloads of the objects it holds.
#[derive(Default)]
pub struct MemoryCloudStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCloudStorage {
    pub const BASE_URL: &'static str = "https://cloud.test/bucket";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn url_for(key: &str) -> String {
        format!("{}/{}", Self::BASE_URL, key.trim_start_matches('/'))
    }

    /// Store `bytes` under `key` and return its download URL.
    pub fn put(&self, key: &str, bytes: &[u8]) -> String {
        let url = Self::url_for(key);
        self.objects
            .lock()
            .unwrap()
            .insert(url.clone(), bytes.to_vec());
        url
    }

    pub fn contains(&self, url: &str) -> bool {
        self.objects.lock().unwrap().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl CloudFileStorage for MemoryCloudStorage {
    async fn upload_multiple_files(&self, files: &[(String, PathBuf)]) -> Result<Vec<String>> {
        let mut urls = Vec::with_capacity(files.len());
        for (destination, file) in files {
            let bytes = tokio::fs::read(file).await?;
            urls.push(self.put(destination, &bytes));
        }
        Ok(urls)
    }

    async fn delete_file_by_download_url(&self, url: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(url);
        Ok(())
    }

    fn owns_url(&self, url: &str) -> bool {
        url.starts_with(Self::BASE_URL)
    }
}

#[async_trait]
impl ImageDownloader for MemoryCloudStorage {
    async fn download(&self, url: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().unwrap().get(url).cloned())
    }
}

/// `MemoryNoteStore` wrapper that counts page reads and can fail every write.
pub struct FlakyNoteStore {
    inner: MemoryNoteStore,
    fail_writes: AtomicBool,
    page_reads: AtomicUsize,
}

impl FlakyNoteStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryNoteStore::initialized(),
            fail_writes: AtomicBool::new(false),
            page_reads: AtomicUsize::new(0),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn page_reads(&self) -> usize {
        self.page_reads.load(Ordering::SeqCst)
    }

    pub async fn all(&self) -> Vec<UniversalNote> {
        self.inner.get_all_notes(-1, 0).await.unwrap()
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::Database("injected write failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NoteStore for FlakyNoteStore {
    async fn initialize(&self) -> Result<()> {
        self.inner.initialize().await
    }

    async fn de_initialize(&self) -> Result<()> {
        self.inner.de_initialize().await
    }

    async fn is_initialized(&self) -> bool {
        self.inner.is_initialized().await
    }

    async fn get_all_notes(&self, limit: i64, page: usize) -> Result<Vec<UniversalNote>> {
        self.page_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_all_notes(limit, page).await
    }

    async fn get_note_by_id(&self, note_id: &NoteId) -> Result<Option<UniversalNote>> {
        self.inner.get_note_by_id(note_id).await
    }

    async fn search_all_notes(&self, query: &str) -> Result<Vec<UniversalNote>> {
        self.inner.search_all_notes(query).await
    }

    async fn insert_note(&self, input: &CreateNoteInput) -> Result<UniversalNote> {
        self.check_write()?;
        self.inner.insert_note(input).await
    }

    async fn insert_notes(&self, inputs: &[CreateNoteInput]) -> Result<Vec<UniversalNote>> {
        self.check_write()?;
        self.inner.insert_notes(inputs).await
    }

    async fn update_note(&self, input: &UpdateNoteInput) -> Result<UniversalNote> {
        self.check_write()?;
        self.inner.update_note(input).await
    }

    async fn update_notes_by_ids(&self, inputs: &[UpdateNoteInput]) -> Result<Vec<UniversalNote>> {
        self.check_write()?;
        self.inner.update_notes_by_ids(inputs).await
    }

    async fn delete_note_by_id(&self, note_id: &NoteId) -> Result<()> {
        self.check_write()?;
        self.inner.delete_note_by_id(note_id).await
    }

    async fn delete_notes_by_ids(&self, note_ids: &[NoteId]) -> Result<()> {
        self.check_write()?;
        self.inner.delete_notes_by_ids(note_ids).await
    }

    async fn delete_all_notes(&self) -> Result<()> {
        self.check_write()?;
        self.inner.delete_all_notes().await
    }
}

/// Sink that remembers which operations failed.
#[derive(Default)]
pub struct RecordingSink {
    operations: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }
}

impl ErrorSink for RecordingSink {
    fn record_error(&self, _error: &Error, operation: &str) {
        self.operations.lock().unwrap().push(operation.to_string());
    }
}
