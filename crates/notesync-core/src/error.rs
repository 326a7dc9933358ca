//! Error types for notesync-core

use thiserror::Error;

/// Result type alias using notesync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in notesync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Note not found
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Media/object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// A cloud operation was attempted without a signed-in user
    #[error("Authentication required for cloud operation")]
    AuthRequired,
}

/// Coarse error category surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Io,
    AuthRequired,
    InvalidInput,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AuthRequired => ErrorKind::AuthRequired,
            Self::InvalidInput(_) | Self::Serialization(_) => ErrorKind::InvalidInput,
            Self::Database(_)
            | Self::Sqlite(_)
            | Self::Io(_)
            | Self::Http(_)
            | Self::Storage(_) => ErrorKind::Io,
        }
    }
}
