//! Notebook export core.
//!
//! This crate provides:
//! - Slug resolution over an injected [`RecordStore`]
//! - The streaming [`ExportPipeline`] driving archive writer and manifest builder
//! - Directory-backed and in-memory record stores
//! - Cancellation, timed attachment reads, logging and exit codes for the CLI

pub mod cancel;
pub mod error;
pub mod exit_codes;
pub mod export;
pub mod logging;
pub mod naming;
pub mod pipeline;
pub mod resolver;
pub mod source;
pub mod store;
pub mod stream;

pub use cancel::CancellationToken;
pub use error::{ErrorKind, ExportError, Result};
pub use export::export_to_dir;
pub use pipeline::{ExportOptions, ExportPipeline, ExportSummary, PipelineState};
pub use resolver::SlugResolver;
pub use source::{ContentSource, RecordStore};
pub use store::{DirectoryStore, MemoryStore, StoreError};
