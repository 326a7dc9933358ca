//! notesync-core - Note synchronization core
//!
//! This crate reconciles a local note store with a cloud note store, keeps the images embedded
//! in note bodies consistent across the device and cloud object storage, and exposes an
//! optimistic, paginated view of the merged notes.

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod images;
pub mod models;
pub mod sink;
pub mod storage;
pub mod store;
pub mod util;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use engine::{Collaborators, NoteSyncEngine, OperationOutcome};
pub use error::{Error, ErrorKind, Result};
pub use models::{CreateNoteInput, NoteId, NoteViewState, UniversalNote, UpdateNoteInput};
