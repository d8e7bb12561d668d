//! Concrete record stores.
//!
//! Both stores implement [`RecordStore`](crate::source::RecordStore) and
//! [`ContentSource`](crate::source::ContentSource):
//! - [`DirectoryStore`]: a notebook directory with `index.json` and `uploads/`
//! - [`MemoryStore`]: in-memory records, used by tests and embedding callers

pub mod directory;
pub mod memory;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

use eln_common::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by record stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid store index {}: {source}", .path.display())]
    Index {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid record data: {0}")]
    Invalid(#[from] ValidationError),

    #[error("attachment path escapes the store: {0}")]
    UnsafePath(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
