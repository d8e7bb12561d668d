//! Notebook export common types.
//!
//! This crate provides the value types shared by the archive writer and the
//! export pipeline:
//! - Record identity (`Slug`, `RecordKind`) and the `ExportRequest`
//! - Immutable record metadata with construction-time validation
//! - Team settings read from the record store
//! - Output format selection for the CLI

pub mod error;
pub mod id;
pub mod output;
pub mod record;
pub mod team;

pub use error::{Result, ValidationError};
pub use id::{ExportRequest, OwnerId, RecordKind, Slug, TeamId};
pub use output::OutputFormat;
pub use record::{AttachmentRef, RecordInfo, RecordMetadata};
pub use team::{TeamRow, TeamSettings};

/// Schema version of the record documents written into archives.
pub const SCHEMA_VERSION: &str = "1.0.0";
