use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::*;
use crate::auth::{AuthUser, SessionAuth};
use crate::images::DeltaCodec;
use crate::storage::FsLocalStorage;
use crate::testing::{FlakyNoteStore, MemoryCloudStorage, RecordingSink};
use crate::ErrorKind;

struct Harness {
    tmp: TempDir,
    config: EngineConfig,
    local: Arc<FlakyNoteStore>,
    cloud: Arc<FlakyNoteStore>,
    files: Arc<MemoryCloudStorage>,
    auth: Arc<SessionAuth>,
    sink: Arc<RecordingSink>,
    engine: NoteSyncEngine,
}

fn harness_with(page_size: usize, signed_in: bool) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let config = EngineConfig::new(tmp.path().join("documents")).with_page_size(page_size);
    let local = Arc::new(FlakyNoteStore::new());
    let cloud = Arc::new(FlakyNoteStore::new());
    let files = Arc::new(MemoryCloudStorage::new());
    let auth = Arc::new(if signed_in {
        SessionAuth::signed_in(AuthUser::new("user-1"))
    } else {
        SessionAuth::signed_out()
    });
    let sink = Arc::new(RecordingSink::default());

    let engine = NoteSyncEngine::new(
        config.clone(),
        Collaborators {
            local_store: local.clone(),
            cloud_store: cloud.clone(),
            local_files: Arc::new(FsLocalStorage),
            cloud_files: files.clone(),
            downloader: files.clone(),
            auth: auth.clone(),
            codec: Arc::new(DeltaCodec),
        },
    )
    .with_error_sink(sink.clone());

    Harness {
        tmp,
        config,
        local,
        cloud,
        files,
        auth,
        sink,
        engine,
    }
}

fn harness() -> Harness {
    harness_with(20, true)
}

impl Harness {
    /// Write a scratch image outside the durable image tree.
    fn cached_image(&self, name: &str) -> String {
        let dir = self.tmp.path().join("cache");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, name.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    async fn local_note(&self, note_id: &NoteId) -> Option<UniversalNote> {
        self.local.get_note_by_id(note_id).await.unwrap()
    }

    async fn cloud_note(&self, note_id: &NoteId) -> Option<UniversalNote> {
        self.cloud.get_note_by_id(note_id).await.unwrap()
    }

    fn note_dir_files(&self, note_id: &NoteId) -> usize {
        std::fs::read_dir(self.config.note_images_dir(note_id))
            .map(Iterator::count)
            .unwrap_or(0)
    }

    async fn create(&self, input: CreateNoteInput) -> UniversalNote {
        let note_id = input.note_id.clone();
        let outcome = self.engine.create(input).await;
        assert!(outcome.is_committed(), "{outcome:?}");
        self.local_note(&note_id).await.unwrap()
    }
}

fn doc(sources: &[&str]) -> String {
    let mut ops: Vec<serde_json::Value> = vec![serde_json::json!({"insert": "Trip notes\n"})];
    ops.extend(
        sources
            .iter()
            .map(|source| serde_json::json!({"insert": {"image": source}})),
    );
    serde_json::to_string(&ops).unwrap()
}

fn images(text: &str) -> Vec<String> {
    DeltaCodec.image_sources(text)
}

fn without_feedback(state: &NoteViewState) -> NoteViewState {
    NoteViewState {
        exception: None,
        message: None,
        ..state.clone()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn local_create_persists_cached_images_under_note_dir() {
    let h = harness();
    let a = h.cached_image("a.png");
    let b = h.cached_image("b.jpg");
    let input = CreateNoteInput::new(doc(&[&a, &b]));
    let note_id = input.note_id.clone();

    let note = h.create(input).await;

    let sources = images(&note.text);
    assert_eq!(sources.len(), 2);
    let dir = h.config.note_images_dir(&note_id);
    assert!(sources.iter().all(|source| Path::new(source).starts_with(&dir)));
    assert_eq!(h.note_dir_files(&note_id), 2);
    assert_eq!(h.cloud_note(&note_id).await, None);
    assert_eq!(h.engine.state().notes, vec![note]);
}

#[tokio::test(flavor = "multi_thread")]
async fn synced_create_writes_cloud_copy_with_cloud_urls() {
    let h = harness();
    let a = h.cached_image("a.png");
    let input = CreateNoteInput::new(doc(&[&a])).synced(true);
    let note_id = input.note_id.clone();

    let note = h.create(input).await;

    let cloud = h.cloud_note(&note_id).await.unwrap();
    assert_eq!(cloud.text, note.text);
    assert_eq!(cloud.owner_user_id.as_deref(), Some("user-1"));
    let sources = images(&note.text);
    assert_eq!(sources.len(), 1);
    assert!(sources[0].starts_with(&MemoryCloudStorage::url_for(&format!(
        "users/user-1/{note_id}/"
    ))));
    assert!(h.files.contains(&sources[0]));
    assert_eq!(h.note_dir_files(&note_id), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn synced_create_while_signed_out_requires_sign_in() {
    let h = harness_with(20, false);
    let input = CreateNoteInput::new(doc(&[&h.cached_image("a.png")])).synced(true);
    let note_id = input.note_id.clone();

    let outcome = h.engine.create(input).await;

    assert_eq!(outcome.error().map(|e| e.kind), Some(ErrorKind::AuthRequired));
    assert!(h.engine.state().notes.is_empty());
    assert_eq!(h.local_note(&note_id).await, None);
    assert_eq!(h.note_dir_files(&note_id), 0);
    assert_eq!(h.files.len(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_note_survives_sign_in_rebuild() {
    let h = harness_with(20, false);
    let offline = h.create(CreateNoteInput::new("written offline")).await;
    let mut remote = CreateNoteInput::new("from another device").synced(true);
    remote.owner_user_id = Some("user-1".to_string());
    h.cloud.insert_note(&remote).await.unwrap();

    h.auth.sign_in(AuthUser::new("user-1"));
    assert!(h.engine.sync_local_notes_from_cloud().await.is_committed());

    assert_eq!(h.local_note(&offline.note_id).await, Some(offline.clone()));
    assert!(h.local_note(&remote.note_id).await.is_some());
    assert!(h.engine.state().find(&offline.note_id).is_some());

    assert!(h.engine.delete_all_cloud_notes_locally().await.is_committed());
    assert_eq!(h.local_note(&offline.note_id).await, Some(offline));
}

#[tokio::test(flavor = "multi_thread")]
async fn enabling_sync_while_signed_out_requires_sign_in() {
    let h = harness_with(20, false);
    let note = h.create(CreateNoteInput::new("local")).await;
    let before = h.engine.state();

    let mut input = UpdateNoteInput::from(&note);
    input.is_sync_with_cloud = true;
    let outcome = h.engine.update(input).await;

    assert_eq!(outcome.error().map(|e| e.kind), Some(ErrorKind::AuthRequired));
    assert_eq!(without_feedback(&h.engine.state()), before);
    assert!(!h.local_note(&note.note_id).await.unwrap().is_sync_with_cloud);
}

#[tokio::test(flavor = "multi_thread")]
async fn inline_data_images_are_left_alone() {
    let h = harness();
    let inline = "data:image/png;base64,iVBORw0KGgo=";
    let input = CreateNoteInput::new(doc(&[inline, &h.cached_image("a.png")]));
    let note_id = input.note_id.clone();

    let note = h.create(input).await;

    let sources = images(&note.text);
    assert_eq!(sources[0], inline);
    assert!(Path::new(&sources[1]).starts_with(h.config.note_images_dir(&note_id)));
    assert_eq!(h.note_dir_files(&note_id), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_create_restores_snapshot_and_reports() {
    let h = harness();
    h.create(CreateNoteInput::new("existing")).await;
    let before = h.engine.state();

    h.local.fail_writes(true);
    let outcome = h.engine.create(CreateNoteInput::new("doomed")).await;

    let after = h.engine.state();
    assert_eq!(without_feedback(&after), before);
    assert_eq!(after.exception.as_ref().map(|e| e.kind), Some(ErrorKind::Io));
    match outcome {
        OperationOutcome::RolledBack { snapshot, error } => {
            assert_eq!(snapshot, before);
            assert_eq!(error.kind, ErrorKind::Io);
        }
        OperationOutcome::Committed(_) => panic!("create should roll back"),
    }
    assert_eq!(h.sink.operations(), vec!["create".to_string()]);

    h.engine.dismiss_feedback();
    assert_eq!(h.engine.state(), before);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_delete_reinserts_at_original_index() {
    let h = harness();
    for text in ["one", "two", "three"] {
        h.create(CreateNoteInput::new(text)).await;
    }
    let before = h.engine.state();
    let middle = before.notes[1].note_id.clone();

    h.local.fail_writes(true);
    let outcome = h.engine.delete(&middle).await;

    assert!(!outcome.is_committed());
    assert_eq!(without_feedback(&h.engine.state()), before);
    assert_eq!(h.engine.state().position(&middle), Some(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_cloud_write_rolls_back_update() {
    let h = harness();
    let note = h.create(CreateNoteInput::new("draft").synced(true)).await;
    let before = h.engine.state();

    h.cloud.fail_writes(true);
    let mut input = UpdateNoteInput::from(&note);
    input.text = "edited".to_string();
    let outcome = h.engine.update(input).await;

    assert!(!outcome.is_committed());
    assert_eq!(without_feedback(&h.engine.state()), before);
    assert_eq!(h.sink.operations(), vec!["update".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn create_then_delete_leaves_nothing_behind() {
    let h = harness();
    let local_input = CreateNoteInput::new(doc(&[&h.cached_image("a.png")]));
    let synced_input = CreateNoteInput::new(doc(&[&h.cached_image("b.png")])).synced(true);
    let local_id = local_input.note_id.clone();
    let synced_id = synced_input.note_id.clone();
    h.create(local_input).await;
    h.create(synced_input).await;
    assert_eq!(h.files.len(), 1);

    assert!(h.engine.delete(&local_id).await.is_committed());
    assert!(h.engine.delete(&synced_id).await.is_committed());

    for note_id in [&local_id, &synced_id] {
        assert_eq!(h.local_note(note_id).await, None);
        assert_eq!(h.cloud_note(note_id).await, None);
        assert_eq!(h.note_dir_files(note_id), 0);
    }
    assert_eq!(h.files.len(), 0);
    assert!(h.engine.state().notes.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_of_unknown_note_is_noop() {
    let h = harness();
    h.create(CreateNoteInput::new("keep")).await;
    let before = h.engine.state();

    let outcome = h.engine.delete(&NoteId::from("missing")).await;

    assert_eq!(outcome, OperationOutcome::Committed(before.clone()));
    assert_eq!(h.engine.state(), before);
}

#[tokio::test(flavor = "multi_thread")]
async fn enabling_sync_moves_images_to_cloud() {
    let h = harness();
    let note = h
        .create(CreateNoteInput::new(doc(&[&h.cached_image("a.png")])))
        .await;
    let local_file = images(&note.text)[0].clone();
    let fresh = h.cached_image("b.png");

    let mut input = UpdateNoteInput::from(&note);
    input.is_sync_with_cloud = true;
    input.text = doc(&[&local_file, &fresh]);
    assert!(h.engine.update(input).await.is_committed());

    let local = h.local_note(&note.note_id).await.unwrap();
    let cloud = h.cloud_note(&note.note_id).await.unwrap();
    assert!(local.is_sync_with_cloud);
    assert_eq!(cloud.text, local.text);
    let sources = images(&local.text);
    assert_eq!(sources.len(), 2);
    assert!(sources.iter().all(|source| h.files.contains(source)));
    assert!(!Path::new(&local_file).exists());
    assert_eq!(h.engine.state().find(&note.note_id), Some(&local));
}

#[tokio::test(flavor = "multi_thread")]
async fn disabling_sync_brings_images_home_and_drops_missing() {
    let h = harness();
    let note = h
        .create(CreateNoteInput::new(doc(&[&h.cached_image("a.png")])).synced(true))
        .await;
    let kept = images(&note.text)[0].clone();
    let gone = MemoryCloudStorage::url_for(&format!("users/user-1/{}/gone.png", note.note_id));

    let mut with_gone = UpdateNoteInput::from(&note);
    with_gone.text = doc(&[&kept, &gone]);
    assert!(h.engine.update(with_gone.clone()).await.is_committed());

    let mut unsync = with_gone;
    unsync.is_sync_with_cloud = false;
    assert!(h.engine.update(unsync).await.is_committed());

    assert_eq!(h.cloud_note(&note.note_id).await, None);
    let local = h.local_note(&note.note_id).await.unwrap();
    assert!(!local.is_sync_with_cloud);
    assert_eq!(local.owner_user_id, None);
    let sources = images(&local.text);
    assert_eq!(sources.len(), 1);
    assert!(Path::new(&sources[0]).starts_with(h.config.note_images_dir(&note.note_id)));
    assert_eq!(std::fs::read(&sources[0]).unwrap(), b"a.png");
    assert!(!h.files.contains(&kept));
}

#[tokio::test(flavor = "multi_thread")]
async fn update_of_missing_note_is_not_found() {
    let h = harness();
    let ghost = CreateNoteInput::new("ghost").into_note();

    let outcome = h.engine.update(UpdateNoteInput::from(&ghost)).await;

    assert_eq!(outcome.error().map(|e| e.kind), Some(ErrorKind::NotFound));
}

#[tokio::test(flavor = "multi_thread")]
async fn get_all_notes_never_duplicates_ids() {
    let h = harness();
    let synced = h.create(CreateNoteInput::new("both").synced(true)).await;
    h.create(CreateNoteInput::new("local only")).await;
    let mut cloud_only = CreateNoteInput::new("cloud only").synced(true);
    cloud_only.owner_user_id = Some("user-1".to_string());
    h.cloud.insert_note(&cloud_only).await.unwrap();

    let notes = h.engine.get_all_notes(UNBOUNDED, 0).await.unwrap();

    assert_eq!(notes.len(), 3);
    let mut ids: Vec<&NoteId> = notes.iter().map(|note| &note.note_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert!(notes.iter().any(|note| note.note_id == synced.note_id));

    h.auth.sign_out();
    assert_eq!(h.engine.get_all_notes(UNBOUNDED, 0).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn search_merges_both_stores() {
    let h = harness();
    h.create(CreateNoteInput::new("groceries: milk")).await;
    h.create(CreateNoteInput::new("groceries: eggs").synced(true))
        .await;
    let mut cloud_only = CreateNoteInput::new("Groceries for the party").synced(true);
    cloud_only.owner_user_id = Some("user-1".to_string());
    h.cloud.insert_note(&cloud_only).await.unwrap();
    h.create(CreateNoteInput::new("unrelated")).await;

    let results = h.engine.search_all_notes("groceries").await.unwrap();

    assert_eq!(results.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn load_more_stops_fetching_after_last_page() {
    let h = harness_with(2, false);
    for i in 0..3 {
        h.create(CreateNoteInput::new(format!("note {i}"))).await;
    }

    let state = h.engine.refresh().await.unwrap();
    assert_eq!(state.notes.len(), 2);
    assert!(!state.is_loading);

    assert_eq!(h.engine.load_more().await.unwrap(), 1);
    assert_eq!(h.engine.state().notes.len(), 3);

    assert_eq!(h.engine.load_more().await.unwrap(), 0);
    let reads = h.local.page_reads();
    assert_eq!(h.engine.load_more().await.unwrap(), 0);
    assert_eq!(h.engine.load_more().await.unwrap(), 0);
    assert_eq!(h.local.page_reads(), reads);
    assert_eq!(h.engine.state().notes.len(), 3);

    h.engine.refresh().await.unwrap();
    assert_eq!(h.engine.state().notes.len(), 2);
    assert_eq!(h.engine.load_more().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn move_to_trash_flags_both_copies() {
    let h = harness();
    let note = h.create(CreateNoteInput::new("old").synced(true)).await;

    assert!(h.engine.move_to_trash(&note.note_id).await.is_committed());

    assert!(h.local_note(&note.note_id).await.unwrap().is_trash);
    assert!(h.cloud_note(&note.note_id).await.unwrap().is_trash);
    assert!(h.engine.state().find(&note.note_id).unwrap().is_trash);
}

#[tokio::test(flavor = "multi_thread")]
async fn move_all_to_trash_flags_every_note() {
    let h = harness();
    let local = h.create(CreateNoteInput::new("local")).await;
    let synced = h.create(CreateNoteInput::new("synced").synced(true)).await;

    assert!(h.engine.move_all_to_trash().await.is_committed());

    assert!(h.engine.state().notes.iter().all(|note| note.is_trash));
    assert!(h.local_note(&local.note_id).await.unwrap().is_trash);
    assert!(h.local_note(&synced.note_id).await.unwrap().is_trash);
    assert!(h.cloud_note(&synced.note_id).await.unwrap().is_trash);
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_trash_removes_exactly_trashed_notes_and_images() {
    let h = harness();
    let keep = h
        .create(CreateNoteInput::new(doc(&[&h.cached_image("keep.png")])))
        .await;
    let keep_synced = h
        .create(CreateNoteInput::new(doc(&[&h.cached_image("ks.png")])).synced(true))
        .await;
    let keep_synced_image = images(&keep_synced.text)[0].clone();
    let local_trash = h
        .create(CreateNoteInput::new(doc(&[&h.cached_image("lt.png")])))
        .await;
    let cloud_trash = h
        .create(CreateNoteInput::new(doc(&[&h.cached_image("ct.png")])).synced(true))
        .await;
    h.engine.move_to_trash(&local_trash.note_id).await;
    h.engine.move_to_trash(&cloud_trash.note_id).await;

    let outcome = h.engine.clear_trash().await;

    assert!(outcome.is_committed());
    let mut ids: Vec<NoteId> = h.engine.state().notes.iter().map(|n| n.note_id.clone()).collect();
    ids.sort();
    let mut expected = vec![keep.note_id.clone(), keep_synced.note_id.clone()];
    expected.sort();
    assert_eq!(ids, expected);
    assert!(h.engine.state().message.is_some());
    assert!(h.local_note(&keep.note_id).await.is_some());
    assert!(h.cloud_note(&keep_synced.note_id).await.is_some());
    assert_eq!(h.note_dir_files(&keep.note_id), 1);
    for trashed in [&local_trash, &cloud_trash] {
        assert_eq!(h.local_note(&trashed.note_id).await, None);
        assert_eq!(h.cloud_note(&trashed.note_id).await, None);
    }
    assert_eq!(h.note_dir_files(&local_trash.note_id), 0);
    assert!(h.files.contains(&keep_synced_image));
    assert_eq!(h.files.len(), 1);
}

/// Marks a local note as synced in the local store only, leaving its files on the device.
async fn synced_with_local_files(h: &Harness) -> UniversalNote {
    let note = h
        .create(CreateNoteInput::new(doc(&[&h.cached_image("stray.png")])))
        .await;
    let mut input = UpdateNoteInput::from(&note);
    input.is_sync_with_cloud = true;
    let note = h.local.update_note(&input).await.unwrap();
    h.engine.refresh().await.unwrap();
    assert_eq!(h.note_dir_files(&note.note_id), 1);
    note
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_trash_deletes_local_files_of_synced_notes() {
    for signed_in in [true, false] {
        let h = harness_with(20, true);
        let note = synced_with_local_files(&h).await;
        assert!(h.engine.move_to_trash(&note.note_id).await.is_committed());
        if !signed_in {
            h.auth.sign_out();
        }

        assert!(h.engine.clear_trash().await.is_committed());

        assert_eq!(h.local_note(&note.note_id).await, None);
        assert_eq!(h.note_dir_files(&note.note_id), 0);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn sign_out_cleanup_deletes_local_files_of_synced_notes() {
    let h = harness();
    let note = synced_with_local_files(&h).await;

    assert!(h.engine.delete_all_cloud_notes_locally().await.is_committed());

    assert_eq!(h.local_note(&note.note_id).await, None);
    assert_eq!(h.note_dir_files(&note.note_id), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_all_wipes_stores_and_images() {
    let h = harness();
    let local = h
        .create(CreateNoteInput::new(doc(&[&h.cached_image("a.png")])))
        .await;
    h.create(CreateNoteInput::new(doc(&[&h.cached_image("b.png")])).synced(true))
        .await;

    assert!(h.engine.delete_all().await.is_committed());

    assert!(h.engine.state().notes.is_empty());
    assert!(h.local.all().await.is_empty());
    assert!(h.cloud.all().await.is_empty());
    assert_eq!(h.note_dir_files(&local.note_id), 0);
    assert_eq!(h.files.len(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn sign_out_cleanup_keeps_cloud_untouched() {
    let h = harness();
    let local = h.create(CreateNoteInput::new("mine")).await;
    let synced = h.create(CreateNoteInput::new("shared").synced(true)).await;

    assert!(h.engine.delete_all_cloud_notes_locally().await.is_committed());

    assert_eq!(h.engine.state().notes.len(), 1);
    assert!(h.local_note(&local.note_id).await.is_some());
    assert_eq!(h.local_note(&synced.note_id).await, None);
    assert!(h.cloud_note(&synced.note_id).await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_from_cloud_rebuilds_local_copies() {
    let h = harness();
    let local = h.create(CreateNoteInput::new("device only")).await;
    let stale = h.create(CreateNoteInput::new("stale copy").synced(true)).await;
    h.cloud.delete_note_by_id(&stale.note_id).await.unwrap();
    let mut remote = CreateNoteInput::new("from another device").synced(true);
    remote.owner_user_id = Some("user-1".to_string());
    h.cloud.insert_note(&remote).await.unwrap();

    let outcome = h.engine.sync_local_notes_from_cloud().await;

    assert!(outcome.is_committed());
    assert_eq!(h.local_note(&stale.note_id).await, None);
    let pulled = h.local_note(&remote.note_id).await.unwrap();
    assert!(pulled.is_sync_with_cloud);
    assert_eq!(pulled.text, "from another device");
    assert!(h.local_note(&local.note_id).await.is_some());

    let mut shown: Vec<NoteId> = h.engine.state().notes.iter().map(|n| n.note_id.clone()).collect();
    shown.sort();
    let mut expected = vec![local.note_id, remote.note_id];
    expected.sort();
    assert_eq!(shown, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_from_cloud_is_noop_when_signed_out_or_empty() {
    let h = harness();
    let synced = h.create(CreateNoteInput::new("shared").synced(true)).await;
    h.cloud.delete_all_notes().await.unwrap();
    let before = h.engine.state();

    assert_eq!(
        h.engine.sync_local_notes_from_cloud().await,
        OperationOutcome::Committed(before.clone())
    );
    assert!(h.local_note(&synced.note_id).await.is_some());

    h.auth.sign_out();
    let reads = h.cloud.page_reads();
    assert!(h.engine.sync_local_notes_from_cloud().await.is_committed());
    assert_eq!(h.cloud.page_reads(), reads);
}

#[tokio::test(flavor = "multi_thread")]
async fn subscribers_see_committed_state() {
    let h = harness();
    let mut rx = h.engine.subscribe();

    h.create(CreateNoteInput::new("watched")).await;

    assert!(rx.has_changed().unwrap());
    let seen = rx.borrow_and_update().clone();
    assert_eq!(seen, h.engine.state());
    assert_eq!(seen.notes.len(), 1);
}

fn assert_rolled_back(
    h: &Harness,
    outcome: &OperationOutcome,
    before: &NoteViewState,
    operation: &str,
) {
    match outcome {
        OperationOutcome::RolledBack { snapshot, error } => {
            assert_eq!(snapshot, before);
            assert_eq!(error.kind, ErrorKind::Io);
        }
        OperationOutcome::Committed(_) => panic!("{operation} should roll back"),
    }
    assert_eq!(without_feedback(&h.engine.state()), *before);
    assert_eq!(h.sink.operations(), vec![operation.to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_move_to_trash_restores_snapshot() {
    let h = harness();
    let note = h.create(CreateNoteInput::new("shared").synced(true)).await;
    let before = h.engine.state();

    h.cloud.fail_writes(true);
    let outcome = h.engine.move_to_trash(&note.note_id).await;

    assert_rolled_back(&h, &outcome, &before, "move_to_trash");
    assert!(!h.engine.state().find(&note.note_id).unwrap().is_trash);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_move_all_to_trash_restores_snapshot() {
    let h = harness();
    h.create(CreateNoteInput::new("one")).await;
    h.create(CreateNoteInput::new("two")).await;
    let before = h.engine.state();

    h.local.fail_writes(true);
    let outcome = h.engine.move_all_to_trash().await;

    assert_rolled_back(&h, &outcome, &before, "move_all_to_trash");
    assert!(h.engine.state().notes.iter().all(|note| !note.is_trash));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_clear_trash_restores_snapshot() {
    let h = harness();
    let kept = h.create(CreateNoteInput::new("kept")).await;
    let trashed = h.create(CreateNoteInput::new("trashed")).await;
    h.engine.move_to_trash(&trashed.note_id).await;
    let before = h.engine.state();

    h.local.fail_writes(true);
    let outcome = h.engine.clear_trash().await;

    assert_rolled_back(&h, &outcome, &before, "clear_trash");
    assert_eq!(h.engine.state().position(&kept.note_id), before.position(&kept.note_id));
    assert!(h.local_note(&trashed.note_id).await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_delete_all_restores_snapshot() {
    let h = harness();
    h.create(CreateNoteInput::new("one")).await;
    h.create(CreateNoteInput::new("two").synced(true)).await;
    let before = h.engine.state();

    h.local.fail_writes(true);
    let outcome = h.engine.delete_all().await;

    assert_rolled_back(&h, &outcome, &before, "delete_all");
    assert_eq!(h.local.all().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_sync_from_cloud_restores_snapshot() {
    let h = harness();
    let synced = h.create(CreateNoteInput::new("shared").synced(true)).await;
    h.create(CreateNoteInput::new("device only")).await;
    let before = h.engine.state();

    h.local.fail_writes(true);
    let outcome = h.engine.sync_local_notes_from_cloud().await;

    assert_rolled_back(&h, &outcome, &before, "sync_local_notes_from_cloud");
    assert!(!h.engine.state().is_loading);
    assert!(h.local_note(&synced.note_id).await.is_some());
}
