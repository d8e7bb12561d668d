//! Streaming writer, manifest builder and verifier for `.eln` archives.
//!
//! An `.eln` archive packages notebook records for preservation outside the
//! system that produced them.
//!
//! # Archive Format
//!
//! Archives are ZIP containers:
//! - `experiments/<id>/record.json`: the record's own metadata and text
//! - `experiments/<id>/<filename>`: one entry per attachment
//! - `resources/<id>/...`: same layout for resources
//! - `manifest.json`: JSON-LD graph describing every record and entry, with
//!   SHA-256 checksums; always the last entry
//!
//! # Streaming
//!
//! [`ArchiveWriter`] writes one entry at a time, hashing content as it passes
//! through. Only the entry index (path, size, checksum) is kept in memory. The
//! output goes to an [`ArchiveSink`]; [`FileSink`] writes to a scratch file and
//! renames it into place on commit, so an abandoned export never leaves a
//! valid-looking archive behind.
//!
//! # Example
//!
//! ```no_run
//! use eln_archive::{ArchiveOptions, ArchiveReader, ArchiveWriter, FileSink};
//! use std::path::Path;
//!
//! let sink = FileSink::create("export.eln").unwrap();
//! let mut writer = ArchiveWriter::new(sink, ArchiveOptions::default());
//! writer.begin_entry("experiments/1/notes.txt", None).unwrap();
//! writer.write_chunk(b"hello").unwrap();
//! let entry = writer.end_entry().unwrap();
//! writer.write_manifest(b"{}").unwrap();
//! let path = writer.finalize().unwrap();
//!
//! let mut reader = ArchiveReader::open(Path::new(&path)).unwrap();
//! let report = reader.verify_all();
//! ```

pub mod error;
pub mod manifest;
pub mod reader;
pub mod sink;
pub mod writer;

pub use error::{ArchiveError, Result};
pub use manifest::{
    Generator, ManifestBuilder, ManifestDocument, ManifestNode, Organization, MANIFEST_CONTEXT,
    MANIFEST_PATH, ROOT_ID,
};
pub use reader::{ArchiveReader, VerifyReport};
pub use sink::{ArchiveSink, FileSink};
pub use writer::{ArchiveEntry, ArchiveOptions, ArchiveWriter, Compression};

/// Current archive layout version, recorded in the manifest.
pub const ARCHIVE_FORMAT_VERSION: &str = "1.0.0";

/// File extension of produced archives.
pub const ARCHIVE_EXTENSION: &str = "eln";
