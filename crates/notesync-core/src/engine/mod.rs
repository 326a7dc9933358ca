//! Note synchronization engine.
//!
//! Every mutating operation snapshots the published view, applies its change optimistically,
//! runs its durable effects in a fixed order, and then either finalizes the view or restores
//! the snapshot with the error attached. Operations are serialized by one async mutex.

mod pagination;
mod transaction;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::auth::AuthProvider;
use crate::config::EngineConfig;
use crate::images::{ImageLocation, ImageMaterializer, ImageResolver, MigrationDirection, RichTextCodec};
use crate::models::{
    CreateNoteInput, NoteId, NoteViewState, UniversalNote, UpdateNoteInput, ViewError,
};
use crate::sink::{ErrorSink, TracingErrorSink};
use crate::storage::{CloudFileStorage, ImageDownloader, LocalFileStorage};
use crate::store::{NoteStore, UNBOUNDED};
use crate::util::unix_timestamp_millis;
use crate::Result;

use pagination::{union_by_id, Pagination};
use transaction::ViewTransaction;

pub use transaction::OperationOutcome;

/// Everything the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub local_store: Arc<dyn NoteStore>,
    pub cloud_store: Arc<dyn NoteStore>,
    pub local_files: Arc<dyn LocalFileStorage>,
    pub cloud_files: Arc<dyn CloudFileStorage>,
    pub downloader: Arc<dyn ImageDownloader>,
    pub auth: Arc<dyn AuthProvider>,
    pub codec: Arc<dyn RichTextCodec>,
}

pub struct NoteSyncEngine {
    config: EngineConfig,
    local: Arc<dyn NoteStore>,
    cloud: Arc<dyn NoteStore>,
    auth: Arc<dyn AuthProvider>,
    images: ImageMaterializer,
    sink: Arc<dyn ErrorSink>,
    state: watch::Sender<NoteViewState>,
    pagination: Mutex<Pagination>,
}

impl NoteSyncEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let resolver = ImageResolver::new(collaborators.codec, config.images_root());
        let images = ImageMaterializer::new(
            resolver,
            config.clone(),
            collaborators.local_files,
            collaborators.cloud_files,
            collaborators.downloader,
            collaborators.auth.clone(),
        );
        let (state, _) = watch::channel(NoteViewState::default());

        Self {
            config,
            local: collaborators.local_store,
            cloud: collaborators.cloud_store,
            auth: collaborators.auth,
            images,
            sink: Arc::new(TracingErrorSink),
            state,
            pagination: Mutex::new(Pagination::default()),
        }
    }

    /// Replace the default `TracingErrorSink`.
    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Initialize both stores.
    pub async fn initialize(&self) -> Result<()> {
        self.local.initialize().await?;
        self.cloud.initialize().await?;
        tracing::info!("Note sync engine initialized");
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<NoteViewState> {
        self.state.subscribe()
    }

    /// Current view snapshot.
    pub fn state(&self) -> NoteViewState {
        self.state.borrow().clone()
    }

    /// Clear the error and message shown to the user.
    pub fn dismiss_feedback(&self) {
        self.state.send_if_modified(|state| {
            let changed = state.exception.is_some() || state.message.is_some();
            state.exception = None;
            state.message = None;
            changed
        });
    }

    fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    fn settle<T>(
        &self,
        tx: ViewTransaction<'_>,
        result: Result<T>,
        finalize: impl FnOnce(&mut NoteViewState, T),
    ) -> OperationOutcome {
        match result {
            Ok(value) => tx.commit(|state| finalize(state, value)),
            Err(error) => {
                self.sink.record_error(&error, tx.operation());
                tx.rollback(&error)
            }
        }
    }

    fn unchanged(&self) -> OperationOutcome {
        OperationOutcome::Committed(self.state())
    }

    // ---- reads ----

    /// One page from the local store merged with the same page from the cloud store.
    ///
    /// A negative `limit` reads everything.
    pub async fn get_all_notes(&self, limit: i64, page: usize) -> Result<Vec<UniversalNote>> {
        let cloud = async {
            if self.is_authenticated() {
                self.cloud.get_all_notes(limit, page).await
            } else {
                Ok(Vec::new())
            }
        };
        let (local, cloud) = tokio::join!(self.local.get_all_notes(limit, page), cloud);
        Ok(union_by_id(local?, cloud?))
    }

    pub async fn search_all_notes(&self, query: &str) -> Result<Vec<UniversalNote>> {
        let cloud = async {
            if self.is_authenticated() {
                self.cloud.search_all_notes(query).await
            } else {
                Ok(Vec::new())
            }
        };
        let (local, cloud) = tokio::join!(self.local.search_all_notes(query), cloud);
        Ok(union_by_id(local?, cloud?))
    }

    fn page_limit(&self) -> i64 {
        i64::try_from(self.config.page_size).unwrap_or(i64::MAX)
    }

    fn publish_read_error(&self, error: &crate::Error) {
        let view_error = ViewError::from(error);
        self.state.send_modify(|state| {
            state.is_loading = false;
            state.exception = Some(view_error);
        });
    }

    /// Reload page 0 and reset pagination.
    pub async fn refresh(&self) -> Result<NoteViewState> {
        let mut pagination = self.pagination.lock().await;
        self.state.send_modify(|state| state.is_loading = true);

        match self.get_all_notes(self.page_limit(), 0).await {
            Ok(notes) => {
                *pagination = Pagination::first_page_loaded();
                self.state.send_modify(|state| {
                    state.notes = notes;
                    state.is_loading = false;
                });
                tracing::debug!("Refreshed notes: {} loaded", self.state.borrow().notes.len());
                Ok(self.state())
            }
            Err(error) => {
                self.publish_read_error(&error);
                Err(error)
            }
        }
    }

    /// Append the next page. Returns how many new notes were added; once a page comes back
    /// empty, later calls return 0 without fetching.
    pub async fn load_more(&self) -> Result<usize> {
        let mut pagination = self.pagination.lock().await;
        if pagination.reached_end {
            return Ok(0);
        }

        let page = pagination.next_page;
        self.state.send_modify(|state| state.is_loading = true);
        let notes = match self.get_all_notes(self.page_limit(), page).await {
            Ok(notes) => notes,
            Err(error) => {
                self.publish_read_error(&error);
                return Err(error);
            }
        };

        if notes.is_empty() {
            pagination.reached_end = true;
            self.state.send_modify(|state| state.is_loading = false);
            tracing::debug!("Reached the last page at {}", page);
            return Ok(0);
        }

        pagination.next_page = page + 1;
        let mut added = 0;
        self.state.send_modify(|state| {
            added = state.append_unique(notes);
            state.is_loading = false;
        });
        Ok(added)
    }

    // ---- create / update ----

    pub async fn create(&self, input: CreateNoteInput) -> OperationOutcome {
        let _serial = self.pagination.lock().await;
        let tx = ViewTransaction::begin(&self.state, "create");

        let optimistic = UniversalNote::from_create(&input, unix_timestamp_millis());
        tx.apply(|state| state.notes.insert(0, optimistic));

        let result = self.create_effects(input).await;
        self.settle(tx, result, |state, note: UniversalNote| {
            tracing::info!("Created note {}", note.note_id);
            state.replace(note);
        })
    }

    /// A synced note needs a signed-in owner before anything is written.
    async fn create_effects(&self, mut input: CreateNoteInput) -> Result<UniversalNote> {
        let to_cloud = input.is_sync_with_cloud;
        if to_cloud {
            input.owner_user_id = Some(self.auth.require_current_user()?.id);
        }

        input.text = self
            .images
            .persist_cached_images(&input.text, &input.note_id, to_cloud)
            .await?;

        let note = self.local.insert_note(&input).await?;
        if to_cloud {
            self.cloud.insert_note(&input).await?;
        }
        Ok(note)
    }

    pub async fn update(&self, input: UpdateNoteInput) -> OperationOutcome {
        let _serial = self.pagination.lock().await;
        let tx = ViewTransaction::begin(&self.state, "update");

        if let Some(current) = tx.snapshot().find(&input.note_id) {
            let optimistic = current.with_update(&input, unix_timestamp_millis());
            tx.apply(|state| {
                state.replace(optimistic);
            });
        }

        let result = self.update_effects(input).await;
        self.settle(tx, result, |state, note: UniversalNote| {
            tracing::info!("Updated note {}", note.note_id);
            state.replace(note);
        })
    }

    async fn update_effects(&self, mut input: UpdateNoteInput) -> Result<UniversalNote> {
        let note_id = input.note_id.clone();
        if input.is_sync_with_cloud {
            self.auth.require_current_user()?;
        }
        let authenticated = self.is_authenticated();
        input.text = self
            .images
            .persist_cached_images(&input.text, &note_id, input.is_sync_with_cloud)
            .await?;

        if authenticated {
            let in_cloud = self.cloud.get_note_by_id(&note_id).await?.is_some();
            if input.is_sync_with_cloud {
                input.text = self
                    .images
                    .migrate_images(&input.text, &note_id, MigrationDirection::LocalToCloud)
                    .await?;
                input.owner_user_id = Some(self.auth.require_current_user()?.id);
                if in_cloud {
                    self.cloud.update_note(&input).await?;
                } else {
                    self.cloud
                        .insert_note(&CreateNoteInput::from(input.clone()))
                        .await?;
                    tracing::info!("Note {} is now synced with cloud", note_id);
                }
            } else if in_cloud {
                self.cloud.delete_note_by_id(&note_id).await?;
                input.text = self
                    .images
                    .migrate_images(&input.text, &note_id, MigrationDirection::CloudToLocal)
                    .await?;
                input.owner_user_id = None;
                tracing::info!("Note {} is no longer synced with cloud", note_id);
            }
        }

        self.local.update_note(&input).await
    }

    // ---- delete / trash ----

    /// Delete one note and its images everywhere. Unknown ids are a no-op.
    pub async fn delete(&self, note_id: &NoteId) -> OperationOutcome {
        let _serial = self.pagination.lock().await;
        let tx = ViewTransaction::begin(&self.state, "delete");
        let Some(index) = tx.snapshot().position(note_id) else {
            return self.unchanged();
        };
        tx.apply(|state| {
            state.notes.remove(index);
        });

        let result = self.delete_effects(note_id).await;
        self.settle(tx, result, |_, ()| {
            tracing::info!("Deleted note {}", note_id);
        })
    }

    async fn delete_effects(&self, note_id: &NoteId) -> Result<()> {
        if let Some(local) = self.local.get_note_by_id(note_id).await? {
            self.images
                .delete_all_images(&local.text, ImageLocation::Local)
                .await?;
            self.local.delete_note_by_id(note_id).await?;
        }

        if self.is_authenticated() {
            if let Some(cloud) = self.cloud.get_note_by_id(note_id).await? {
                self.images
                    .delete_all_images(&cloud.text, ImageLocation::Cloud)
                    .await?;
                self.cloud.delete_note_by_id(note_id).await?;
            }
        }
        Ok(())
    }

    pub async fn move_to_trash(&self, note_id: &NoteId) -> OperationOutcome {
        let _serial = self.pagination.lock().await;
        let tx = ViewTransaction::begin(&self.state, "move_to_trash");
        let Some(current) = tx.snapshot().find(note_id) else {
            return self.unchanged();
        };

        let mut input = UpdateNoteInput::from(current);
        input.is_trash = true;
        tx.apply(|state| {
            if let Some(index) = state.position(note_id) {
                state.notes[index].is_trash = true;
            }
        });

        let result = self.trash_effects(input).await;
        self.settle(tx, result, |state, note: UniversalNote| {
            tracing::info!("Moved note {} to trash", note.note_id);
            state.replace(note);
        })
    }

    async fn trash_effects(&self, input: UpdateNoteInput) -> Result<UniversalNote> {
        let note = self.local.update_note(&input).await?;
        if self.is_authenticated() && self.cloud.get_note_by_id(&input.note_id).await?.is_some() {
            self.cloud.update_note(&input).await?;
        }
        Ok(note)
    }

    pub async fn move_all_to_trash(&self) -> OperationOutcome {
        let _serial = self.pagination.lock().await;
        let tx = ViewTransaction::begin(&self.state, "move_all_to_trash");
        let inputs: Vec<UpdateNoteInput> = tx
            .snapshot()
            .notes
            .iter()
            .filter(|note| !note.is_trash)
            .map(|note| UpdateNoteInput {
                is_trash: true,
                ..UpdateNoteInput::from(note)
            })
            .collect();
        if inputs.is_empty() {
            return self.unchanged();
        }

        tx.apply(|state| {
            for note in &mut state.notes {
                note.is_trash = true;
            }
        });

        let result = self.trash_all_effects(&inputs).await;
        self.settle(tx, result, |state, notes: Vec<UniversalNote>| {
            tracing::info!("Moved {} notes to trash", notes.len());
            for note in notes {
                state.replace(note);
            }
        })
    }

    async fn trash_all_effects(&self, inputs: &[UpdateNoteInput]) -> Result<Vec<UniversalNote>> {
        let notes = self.local.update_notes_by_ids(inputs).await?;
        if self.is_authenticated() {
            let synced: Vec<UpdateNoteInput> = inputs
                .iter()
                .filter(|input| input.is_sync_with_cloud)
                .cloned()
                .collect();
            if !synced.is_empty() {
                self.cloud.update_notes_by_ids(&synced).await?;
            }
        }
        Ok(notes)
    }

    /// Permanently delete every trashed note in view, with its images.
    pub async fn clear_trash(&self) -> OperationOutcome {
        let _serial = self.pagination.lock().await;
        let tx = ViewTransaction::begin(&self.state, "clear_trash");
        let trashed = tx.snapshot().trashed();
        if trashed.is_empty() {
            return self.unchanged();
        }

        tx.apply(|state| state.notes.retain(|note| !note.is_trash));

        let result = self.clear_trash_effects(&trashed).await;
        let count = trashed.len();
        self.settle(tx, result, |state, ()| {
            tracing::info!("Cleared {} notes from trash", count);
            state.message = Some(format!("Deleted {count} notes from trash"));
        })
    }

    async fn clear_trash_effects(&self, trashed: &[UniversalNote]) -> Result<()> {
        let authenticated = self.is_authenticated();
        for note in trashed {
            self.images
                .delete_all_images(&note.text, ImageLocation::Local)
                .await?;
            if note.is_sync_with_cloud && authenticated {
                self.images
                    .delete_all_images(&note.text, ImageLocation::Cloud)
                    .await?;
            }
        }

        let ids: Vec<NoteId> = trashed.iter().map(|note| note.note_id.clone()).collect();
        self.local.delete_notes_by_ids(&ids).await?;
        if authenticated {
            self.cloud.delete_notes_by_ids(&ids).await?;
        }
        Ok(())
    }

    /// Delete every note in both stores. Images go before records.
    pub async fn delete_all(&self) -> OperationOutcome {
        let _serial = self.pagination.lock().await;
        let tx = ViewTransaction::begin(&self.state, "delete_all");
        tx.apply(|state| state.notes.clear());

        let result = self.delete_all_effects().await;
        self.settle(tx, result, |_, ()| {
            tracing::info!("Deleted all notes");
        })
    }

    async fn delete_all_effects(&self) -> Result<()> {
        let authenticated = self.is_authenticated();
        if authenticated {
            for note in self.cloud.get_all_notes(UNBOUNDED, 0).await? {
                self.images
                    .delete_all_images(&note.text, ImageLocation::Cloud)
                    .await?;
            }
        }
        for note in self.local.get_all_notes(UNBOUNDED, 0).await? {
            self.images
                .delete_all_images(&note.text, ImageLocation::Local)
                .await?;
        }

        self.local.delete_all_notes().await?;
        if authenticated {
            self.cloud.delete_all_notes().await?;
        }
        Ok(())
    }

    // ---- sign-in / sign-out ----

    /// Drop the local copies of cloud-synced notes. The cloud is left alone.
    pub async fn delete_all_cloud_notes_locally(&self) -> OperationOutcome {
        let _serial = self.pagination.lock().await;
        let tx = ViewTransaction::begin(&self.state, "delete_all_cloud_notes_locally");
        tx.apply(|state| state.notes.retain(|note| !note.is_sync_with_cloud));

        let result = self.delete_synced_local_copies().await;
        self.settle(tx, result, |_, removed: usize| {
            tracing::info!("Removed {} synced notes from this device", removed);
        })
    }

    /// Local image files of the dropped notes go too; cloud objects stay with the cloud copy.
    async fn delete_synced_local_copies(&self) -> Result<usize> {
        let synced: Vec<UniversalNote> = self
            .local
            .get_all_notes(UNBOUNDED, 0)
            .await?
            .into_iter()
            .filter(|note| note.is_sync_with_cloud && !note.note_id.is_empty())
            .collect();
        for note in &synced {
            self.images
                .delete_all_images(&note.text, ImageLocation::Local)
                .await?;
        }

        let ids: Vec<NoteId> = synced.into_iter().map(|note| note.note_id).collect();
        if !ids.is_empty() {
            self.local.delete_notes_by_ids(&ids).await?;
        }
        Ok(ids.len())
    }

    /// Rebuild local copies of synced notes from the cloud, then reload page 0.
    pub async fn sync_local_notes_from_cloud(&self) -> OperationOutcome {
        let mut pagination = self.pagination.lock().await;
        if !self.is_authenticated() {
            return self.unchanged();
        }

        let tx = ViewTransaction::begin(&self.state, "sync_local_notes_from_cloud");
        tx.apply(|state| state.is_loading = true);

        let result = self.sync_from_cloud_effects().await;
        if matches!(result, Ok(Some(_))) {
            *pagination = Pagination::first_page_loaded();
        }
        self.settle(tx, result, |state, reloaded: Option<(usize, Vec<UniversalNote>)>| {
            if let Some((count, notes)) = reloaded {
                tracing::info!("Synced {} notes from cloud", count);
                state.notes = notes;
                state.message = Some(format!("Synced {count} notes from cloud"));
            }
        })
    }

    async fn sync_from_cloud_effects(&self) -> Result<Option<(usize, Vec<UniversalNote>)>> {
        let cloud_notes = self.cloud.get_all_notes(UNBOUNDED, 0).await?;
        if cloud_notes.is_empty() {
            return Ok(None);
        }

        self.delete_synced_local_copies().await?;

        let mut seen = HashSet::new();
        let inputs: Vec<CreateNoteInput> = cloud_notes
            .iter()
            .filter(|note| seen.insert(note.note_id.clone()))
            .map(|note| CreateNoteInput {
                is_sync_with_cloud: true,
                ..CreateNoteInput::from(note)
            })
            .collect();
        self.local.insert_notes(&inputs).await?;

        let notes = self.get_all_notes(self.page_limit(), 0).await?;
        Ok(Some((inputs.len(), notes)))
    }
}
