//! Archive entry and output file naming.
//!
//! Entry paths are a deterministic function of the slug and the attachment's
//! position in the record, so the same record always produces the same paths.

use chrono::{DateTime, Utc};
use eln_archive::ARCHIVE_EXTENSION;
use eln_common::{OwnerId, Slug};
use std::collections::HashSet;

/// Entry name of the per-record metadata document.
pub const RECORD_DOCUMENT: &str = "record.json";

/// Make an attachment filename safe to use as the last segment of an entry path.
///
/// Path separators and control characters become `_`; names that are empty or
/// relative (`.`, `..`) after trimming become `attachment-<index>`.
pub fn sanitize_filename(name: &str, index: usize) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        format!("attachment-{}", index)
    } else {
        cleaned.to_string()
    }
}

/// Assigns unique entry names within one record.
#[derive(Debug)]
pub struct EntryNames {
    used: HashSet<String>,
}

impl Default for EntryNames {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryNames {
    /// The record document name is reserved from the start.
    pub fn new() -> Self {
        let mut used = HashSet::new();
        used.insert(RECORD_DOCUMENT.to_string());
        EntryNames { used }
    }

    /// Name for the attachment at `index`.
    ///
    /// A name already taken in this record becomes `<index>-<name>`; should
    /// that be taken too, a counter is inserted: `<index>-<n>-<name>`.
    pub fn assign(&mut self, filename: &str, index: usize) -> String {
        let base = sanitize_filename(filename, index);
        if self.used.insert(base.clone()) {
            return base;
        }

        let prefixed = format!("{}-{}", index, base);
        if self.used.insert(prefixed.clone()) {
            return prefixed;
        }

        let mut counter = 2usize;
        loop {
            let candidate = format!("{}-{}-{}", index, counter, base);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Entry path of a file within a record: `<kind-dir>/<id>/<name>`.
pub fn entry_path(slug: &Slug, name: &str) -> String {
    format!("{}{}", slug.dir_path(), name)
}

/// `export-<YYYY-MM-DD_HH-MM-SS>-userid-<owner>.eln`
pub fn output_file_name(owner: OwnerId, at: DateTime<Utc>) -> String {
    format!(
        "export-{}-userid-{}.{}",
        at.format("%Y-%m-%d_%H-%M-%S"),
        owner,
        ARCHIVE_EXTENSION
    )
}
