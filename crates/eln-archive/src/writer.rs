//! Streaming archive writer.
//!
//! Entries are written in a single forward pass: `begin_entry`, any number of
//! `write_chunk` calls, then `end_entry`. The SHA-256 of each entry is computed
//! as chunks pass through, never by re-reading. The writer keeps only the
//! entry index in memory.

use crate::manifest::MANIFEST_PATH;
use crate::sink::{ArchiveSink, CutHandle, SinkGuard};
use crate::{ArchiveError, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::Write;
use tracing::{debug, info, warn};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// Entries at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Compression applied to archive entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

impl Compression {
    fn method(&self) -> CompressionMethod {
        match self {
            Compression::Deflated => CompressionMethod::Deflated,
            Compression::Stored => CompressionMethod::Stored,
        }
    }
}

/// Writer settings.
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    pub compression: Compression,
    /// Modification time stamped on every entry. Defaults to the DOS epoch.
    pub modified_at: Option<DateTime<Utc>>,
}

impl ArchiveOptions {
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.modified_at = Some(at);
        self
    }
}

/// One closed entry in the archive index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Forward-slash separated path within the archive.
    pub path: String,
    /// Uncompressed size in bytes.
    pub size_bytes: u64,
    /// SHA-256 of the uncompressed content (64 hex characters).
    pub sha256: String,
}

impl ArchiveEntry {
    /// Compute the SHA-256 checksum of data.
    pub fn compute_checksum(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Verify the checksum against data.
    pub fn verify(&self, data: &[u8]) -> bool {
        data.len() as u64 == self.size_bytes && Self::compute_checksum(data) == self.sha256
    }
}

struct OpenEntry {
    path: String,
    hasher: Sha256,
    bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Finalized,
    Aborted,
}

/// Entry-oriented streaming writer over an [`ArchiveSink`].
pub struct ArchiveWriter<S: ArchiveSink> {
    zip: Option<ZipWriter<SinkGuard<S>>>,
    cut: CutHandle,
    options: FileOptions<'static, ()>,
    current: Option<OpenEntry>,
    index: Vec<ArchiveEntry>,
    paths: HashSet<String>,
    manifest_written: bool,
    state: WriterState,
    bytes_written: u64,
}

impl<S: ArchiveSink> ArchiveWriter<S> {
    /// Wrap an already-open sink.
    pub fn new(sink: S, options: ArchiveOptions) -> Self {
        let modified = options
            .modified_at
            .map(zip_timestamp)
            .unwrap_or_default();

        let file_options: FileOptions<'static, ()> = FileOptions::default()
            .compression_method(options.compression.method())
            .last_modified_time(modified)
            .unix_permissions(0o644);

        let guard = SinkGuard::new(sink);
        let cut = guard.cut_handle();

        Self {
            zip: Some(ZipWriter::new(guard)),
            cut,
            options: file_options,
            current: None,
            index: Vec::new(),
            paths: HashSet::new(),
            manifest_written: false,
            state: WriterState::Open,
            bytes_written: 0,
        }
    }

    /// Open a new entry. Fails if an entry is open, the writer is closed, the
    /// path is malformed or reserved, or the path was already written.
    pub fn begin_entry(&mut self, path: &str, estimated_size: Option<u64>) -> Result<()> {
        self.ensure_accepting()?;
        validate_entry_path(path)?;
        if path == MANIFEST_PATH {
            return Err(ArchiveError::InvalidPath {
                path: path.to_string(),
                reason: "reserved for the manifest".to_string(),
            });
        }
        self.start(path, estimated_size)
    }

    /// Append bytes to the open entry.
    pub fn write_chunk(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let entry = self
            .current
            .as_mut()
            .ok_or_else(|| ArchiveError::State("no entry is open".to_string()))?;
        let zip = self
            .zip
            .as_mut()
            .ok_or_else(|| ArchiveError::State("archive is closed".to_string()))?;

        zip.write_all(bytes)?;
        entry.hasher.update(bytes);
        entry.bytes += bytes.len() as u64;
        Ok(())
    }

    /// Close the open entry and return its index record.
    pub fn end_entry(&mut self) -> Result<ArchiveEntry> {
        self.ensure_writable()?;
        let open = self
            .current
            .take()
            .ok_or_else(|| ArchiveError::State("no entry is open".to_string()))?;

        let entry = ArchiveEntry {
            path: open.path,
            size_bytes: open.bytes,
            sha256: hex::encode(open.hasher.finalize()),
        };

        self.bytes_written += entry.size_bytes;
        self.index.push(entry.clone());

        debug!(path = %entry.path, bytes = entry.size_bytes, "Archive entry written");
        Ok(entry)
    }

    /// Write the manifest as the final entry. No entries may follow it.
    pub fn write_manifest(&mut self, bytes: &[u8]) -> Result<ArchiveEntry> {
        self.ensure_accepting()?;
        self.start(MANIFEST_PATH, Some(bytes.len() as u64))?;
        self.write_chunk(bytes)?;
        let entry = self.end_entry()?;
        self.manifest_written = true;
        Ok(entry)
    }

    /// Write the container trailer and commit the sink.
    pub fn finalize(&mut self) -> Result<S::Output> {
        self.ensure_writable()?;
        if let Some(open) = &self.current {
            return Err(ArchiveError::State(format!(
                "cannot finalize while entry '{}' is open",
                open.path
            )));
        }

        let zip = self
            .zip
            .take()
            .ok_or_else(|| ArchiveError::State("archive is closed".to_string()))?;

        let result = zip
            .finish()
            .map_err(ArchiveError::from)
            .and_then(|guard| guard.into_inner().map_err(ArchiveError::from))
            .and_then(|sink| sink.commit().map_err(ArchiveError::from));

        match result {
            Ok(output) => {
                self.state = WriterState::Finalized;
                info!(
                    entries = self.index.len(),
                    bytes = self.bytes_written,
                    "Archive finalized"
                );
                Ok(output)
            }
            Err(e) => {
                self.state = WriterState::Aborted;
                Err(e)
            }
        }
    }

    /// Abandon the archive and discard partial output.
    ///
    /// The sink is cut off before the zip writer closes, so whatever already
    /// reached it never gets a central directory.
    /// Idempotent once aborted; fails only if the archive was already finalized.
    pub fn abort(&mut self) -> Result<()> {
        match self.state {
            WriterState::Finalized => Err(ArchiveError::State(
                "archive already finalized".to_string(),
            )),
            WriterState::Aborted => Ok(()),
            WriterState::Open => {
                self.state = WriterState::Aborted;
                let open = self.current.take();
                self.cut.cut_off();
                if let Some(zip) = self.zip.take() {
                    // Closing writes only to the cut-off guard.
                    if let Err(e) = zip.finish() {
                        debug!(error = %e, "Closing aborted archive failed");
                    }
                }
                warn!(
                    entries = self.index.len(),
                    open_entry = ?open.map(|e| e.path),
                    "Archive aborted"
                );
                Ok(())
            }
        }
    }

    /// Entries closed so far, in write order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.index
    }

    /// Total uncompressed bytes across closed entries.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn has_open_entry(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_finalized(&self) -> bool {
        self.state == WriterState::Finalized
    }

    pub fn is_aborted(&self) -> bool {
        self.state == WriterState::Aborted
    }

    fn start(&mut self, path: &str, estimated_size: Option<u64>) -> Result<()> {
        if self.paths.contains(path) {
            return Err(ArchiveError::DuplicatePath(path.to_string()));
        }

        // Unknown sizes get zip64 headers up front; the sink cannot be rewound
        // to add them once the entry outgrows 4 GiB.
        let large = estimated_size.map_or(true, |size| size >= ZIP64_THRESHOLD);
        let options = self.options.large_file(large);

        let zip = self
            .zip
            .as_mut()
            .ok_or_else(|| ArchiveError::State("archive is closed".to_string()))?;
        zip.start_file(path, options)?;

        self.paths.insert(path.to_string());
        self.current = Some(OpenEntry {
            path: path.to_string(),
            hasher: Sha256::new(),
            bytes: 0,
        });
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.state {
            WriterState::Open => Ok(()),
            WriterState::Finalized => Err(ArchiveError::State("archive already finalized".to_string())),
            WriterState::Aborted => Err(ArchiveError::State("archive was aborted".to_string())),
        }
    }

    fn ensure_accepting(&self) -> Result<()> {
        self.ensure_writable()?;
        if let Some(open) = &self.current {
            return Err(ArchiveError::State(format!(
                "entry '{}' is still open",
                open.path
            )));
        }
        if self.manifest_written {
            return Err(ArchiveError::State(
                "manifest already written; no entries may follow it".to_string(),
            ));
        }
        Ok(())
    }
}

impl<S: ArchiveSink> Drop for ArchiveWriter<S> {
    fn drop(&mut self) {
        if self.state == WriterState::Open {
            let _ = self.abort();
        }
    }
}

fn zip_timestamp(at: DateTime<Utc>) -> zip::DateTime {
    zip::DateTime::from_date_and_time(
        at.year().clamp(1980, 2107) as u16,
        at.month() as u8,
        at.day() as u8,
        at.hour() as u8,
        at.minute() as u8,
        at.second() as u8,
    )
    .unwrap_or_default()
}

/// Entry paths are clean, relative, forward-slash separated file paths.
pub fn validate_entry_path(path: &str) -> Result<()> {
    let invalid = |reason: &str| ArchiveError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.is_empty() {
        return Err(invalid("empty path"));
    }
    if path.starts_with('/') {
        return Err(invalid("absolute path"));
    }
    if path.contains('\\') {
        return Err(invalid("backslash separator"));
    }
    if path.chars().any(char::is_control) {
        return Err(invalid("control character"));
    }
    if path.ends_with('/') {
        return Err(invalid("directory path"));
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("empty or relative segment"));
    }
    Ok(())
}
