//! Error types for archive operations.

use thiserror::Error;

/// Errors that can occur while writing or reading an archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// I/O error from the underlying sink or source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP container error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Entry protocol violated (entry already open, none open, writer closed)
    #[error("archive state violation: {0}")]
    State(String),

    /// Entry path already written
    #[error("duplicate entry path: {0}")]
    DuplicatePath(String),

    /// Entry path is not a clean relative path
    #[error("invalid entry path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Checksum verification failed
    #[error("checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Missing required entry in archive
    #[error("missing required entry: {0}")]
    MissingEntry(String),

    /// Corrupted manifest
    #[error("corrupted manifest: {0}")]
    CorruptedManifest(String),
}

impl ArchiveError {
    /// Whether this error is a violation of the writer's entry protocol, as
    /// opposed to a failure of the sink underneath it.
    pub fn is_state_violation(&self) -> bool {
        matches!(
            self,
            ArchiveError::State(_) | ArchiveError::DuplicatePath(_) | ArchiveError::InvalidPath { .. }
        )
    }

    /// Whether this error came from the output sink.
    pub fn is_sink_failure(&self) -> bool {
        matches!(self, ArchiveError::Io(_) | ArchiveError::Zip(_))
    }
}

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
