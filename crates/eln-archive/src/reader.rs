//! Archive reader for opening and verifying `.eln` files.
//!
//! Reads ZIP archives with integrity verification against the manifest.

use crate::manifest::{DatasetNode, FileNode};
use crate::{ArchiveEntry, ArchiveError, ManifestDocument, Result, ARCHIVE_FORMAT_VERSION, MANIFEST_PATH};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use sha2::{Digest, Sha256};
use std::io::{self, Cursor, Read, Seek};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Reader for `.eln` archives with verification.
pub struct ArchiveReader<R: Read + Seek> {
    manifest: ManifestDocument,
    archive: ZipArchive<R>,
    verified: HashMap<String, bool>,
}

impl ArchiveReader<File> {
    /// Open an archive from a file path.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl ArchiveReader<Cursor<Vec<u8>>> {
    /// Open an archive from bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Create a reader from any Read + Seek source.
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;

        let manifest = Self::read_manifest(&mut archive)?;
        manifest.validate()?;

        info!(
            records = manifest.records().len(),
            files = manifest.files().len(),
            "Archive opened"
        );

        Ok(Self {
            manifest,
            archive,
            verified: HashMap::new(),
        })
    }

    fn read_manifest(archive: &mut ZipArchive<R>) -> Result<ManifestDocument> {
        let mut manifest_file = archive
            .by_name(MANIFEST_PATH)
            .map_err(|_| ArchiveError::MissingEntry(MANIFEST_PATH.to_string()))?;

        let mut json = Vec::new();
        manifest_file.read_to_end(&mut json)?;

        let manifest = ManifestDocument::from_slice(&json)?;

        let version = manifest.descriptor().and_then(|d| d.version.as_deref());
        if version != Some(ARCHIVE_FORMAT_VERSION) {
            warn!(
                archive_version = ?version,
                supported = %ARCHIVE_FORMAT_VERSION,
                "Archive version mismatch"
            );
        }

        Ok(manifest)
    }

    pub fn manifest(&self) -> &ManifestDocument {
        &self.manifest
    }

    /// File nodes listed in the manifest.
    pub fn files(&self) -> Vec<&FileNode> {
        self.manifest.files()
    }

    /// Record dataset nodes listed in the manifest.
    pub fn records(&self) -> Vec<&DatasetNode> {
        self.manifest.records()
    }

    /// Whether the container holds an entry at `path`.
    pub fn has_entry(&self, path: &str) -> bool {
        self.archive.file_names().any(|name| name == path)
    }

    /// Entry names in container order.
    pub fn entry_names(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(self.archive.len());
        for index in 0..self.archive.len() {
            names.push(self.archive.by_index(index)?.name().to_string());
        }
        Ok(names)
    }

    /// Read an entry without verification.
    ///
    /// Use `read_verified` for integrity-checked reads.
    pub fn read_raw(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut file = self
            .archive
            .by_name(path)
            .map_err(|_| ArchiveError::MissingEntry(path.to_string()))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        debug!(path, bytes = data.len(), "Read entry (unverified)");

        Ok(data)
    }

    /// Read an entry and check its size and checksum against the manifest.
    ///
    /// Loads the whole entry; meant for small JSON entries. Use
    /// [`verify_entry`](Self::verify_entry) to check attachments.
    pub fn read_verified(&mut self, path: &str) -> Result<Vec<u8>> {
        let node = self.listed_file(path)?;
        let data = self.read_raw(path)?;
        let actual = ArchiveEntry::compute_checksum(&data);
        self.check(path, node, actual, data.len() as u64)?;
        Ok(data)
    }

    /// Stream an entry through SHA-256 and check it against the manifest.
    ///
    /// Memory use does not depend on the entry size. Returns the number of
    /// uncompressed bytes checked.
    pub fn verify_entry(&mut self, path: &str) -> Result<u64> {
        let node = self.listed_file(path)?;
        let mut file = self
            .archive
            .by_name(path)
            .map_err(|_| ArchiveError::MissingEntry(path.to_string()))?;

        let mut hasher = Sha256::new();
        let size = io::copy(&mut file, &mut hasher)?;
        drop(file);

        let actual = hex::encode(hasher.finalize());
        self.check(path, node, actual, size)?;
        Ok(size)
    }

    fn listed_file(&self, path: &str) -> Result<FileNode> {
        self.manifest
            .find_file(path)
            .cloned()
            .ok_or_else(|| ArchiveError::MissingEntry(path.to_string()))
    }

    fn check(&mut self, path: &str, node: FileNode, actual: String, size: u64) -> Result<()> {
        if actual != node.sha256 || size != node.content_size {
            return Err(ArchiveError::ChecksumMismatch {
                path: path.to_string(),
                expected: node.sha256,
                actual,
            });
        }

        self.verified.insert(path.to_string(), true);
        debug!(path, bytes = size, "Entry verified");
        Ok(())
    }

    pub fn is_verified(&self, path: &str) -> bool {
        self.verified.get(path).copied().unwrap_or(false)
    }

    /// Read and parse a JSON entry.
    pub fn read_json<T: serde::de::DeserializeOwned>(&mut self, path: &str) -> Result<T> {
        let data = self.read_verified(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Verify every entry against the manifest.
    ///
    /// Also checks that the manifest and the container list the same paths
    /// and that the manifest is the last entry.
    pub fn verify_all(&mut self) -> VerifyReport {
        let mut report = VerifyReport::default();

        let listed: BTreeSet<String> = self.manifest.files().iter().map(|f| f.id.clone()).collect();
        let present: BTreeSet<String> = self
            .archive
            .file_names()
            .filter(|name| *name != MANIFEST_PATH)
            .map(str::to_string)
            .collect();

        report.unlisted = present.difference(&listed).cloned().collect();
        report.manifest_last = self
            .archive
            .len()
            .checked_sub(1)
            .and_then(|last| self.archive.by_index(last).ok().map(|f| f.name() == MANIFEST_PATH))
            .unwrap_or(false);

        for path in listed {
            if !present.contains(&path) {
                report.missing.push(path);
                continue;
            }
            match self.verify_entry(&path) {
                Ok(_) => report.verified.push(path),
                Err(e) => {
                    warn!(path = %path, error = %e, "Verification failed");
                    report.failures.push(path);
                }
            }
        }

        if report.is_ok() {
            info!(verified = report.verified.len(), "All entries verified");
        } else {
            warn!(
                failures = ?report.failures,
                missing = ?report.missing,
                unlisted = ?report.unlisted,
                manifest_last = report.manifest_last,
                "Archive verification failed"
            );
        }

        report
    }
}

/// Outcome of [`ArchiveReader::verify_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Entries whose content matched the manifest
    pub verified: Vec<String>,
    /// Entries whose checksum or size did not match
    pub failures: Vec<String>,
    /// Paths listed in the manifest but absent from the container
    pub missing: Vec<String>,
    /// Container entries not listed in the manifest
    pub unlisted: Vec<String>,
    pub manifest_last: bool,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
            && self.missing.is_empty()
            && self.unlisted.is_empty()
            && self.manifest_last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArchiveOptions, ArchiveWriter, Generator, ManifestBuilder};
    use chrono::{TimeZone, Utc};
    use eln_common::{RecordInfo, RecordKind};
    use std::io::Write;

    fn write_entry<S: crate::ArchiveSink>(
        writer: &mut ArchiveWriter<S>,
        path: &str,
        data: &[u8],
    ) -> ArchiveEntry {
        writer.begin_entry(path, Some(data.len() as u64)).unwrap();
        writer.write_chunk(data).unwrap();
        writer.end_entry().unwrap()
    }

    fn create_test_archive() -> Vec<u8> {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()), ArchiveOptions::default());
        let entries = vec![
            write_entry(&mut writer, "experiments/5/record.json", br#"{"id":5}"#),
            write_entry(&mut writer, "experiments/5/data.txt", b"test data"),
        ];

        let mut builder = ManifestBuilder::new(Generator::new("eln-export", "0.1.0"));
        let info = RecordInfo::new(RecordKind::Experiment, 5, "Titration", at, "Ada").unwrap();
        builder.add_record(info, entries);

        writer
            .write_manifest(&builder.build("export", at).unwrap())
            .unwrap();
        writer.finalize().unwrap()
    }

    #[test]
    fn test_reader_from_bytes() {
        let reader = ArchiveReader::from_bytes(create_test_archive()).unwrap();
        assert_eq!(reader.records().len(), 1);
        assert_eq!(reader.files().len(), 2);
        assert!(reader.has_entry("experiments/5/data.txt"));
        assert!(!reader.has_entry("missing.txt"));
    }

    #[test]
    fn test_reader_read_verified() {
        let mut reader = ArchiveReader::from_bytes(create_test_archive()).unwrap();
        let data = reader.read_verified("experiments/5/data.txt").unwrap();
        assert_eq!(data, b"test data");
        assert!(reader.is_verified("experiments/5/data.txt"));
    }

    #[test]
    fn test_reader_read_json() {
        let mut reader = ArchiveReader::from_bytes(create_test_archive()).unwrap();
        let record: serde_json::Value = reader.read_json("experiments/5/record.json").unwrap();
        assert_eq!(record["id"], 5);
    }

    #[test]
    fn test_reader_verify_all() {
        let mut reader = ArchiveReader::from_bytes(create_test_archive()).unwrap();
        let report = reader.verify_all();
        assert!(report.is_ok(), "{:?}", report);
        assert_eq!(report.verified.len(), 2);
        assert!(report.manifest_last);
    }

    #[test]
    fn test_reader_entry_order() {
        let mut reader = ArchiveReader::from_bytes(create_test_archive()).unwrap();
        assert_eq!(
            reader.entry_names().unwrap(),
            vec![
                "experiments/5/record.json".to_string(),
                "experiments/5/data.txt".to_string(),
                MANIFEST_PATH.to_string(),
            ]
        );
    }

    #[test]
    fn test_reader_missing_entry() {
        let mut reader = ArchiveReader::from_bytes(create_test_archive()).unwrap();
        let result = reader.read_verified("missing.txt");
        assert!(matches!(result, Err(ArchiveError::MissingEntry(_))));
    }

    #[test]
    fn test_reader_rejects_archive_without_manifest() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("experiments/1/a.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"a").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let result = ArchiveReader::from_bytes(bytes);
        assert!(matches!(result, Err(ArchiveError::MissingEntry(_))));
    }

    #[test]
    fn test_verify_detects_tampered_and_unlisted() {
        // Rebuild the container with one entry altered and one extra entry.
        let original = create_test_archive();
        let mut source = ZipArchive::new(Cursor::new(original)).unwrap();
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();

        zip.start_file("experiments/5/extra.bin", options).unwrap();
        zip.write_all(b"extra").unwrap();
        for index in 0..source.len() {
            let mut file = source.by_index(index).unwrap();
            let name = file.name().to_string();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            if name == "experiments/5/data.txt" {
                data = b"tampered!".to_vec();
            }
            zip.start_file(name, options).unwrap();
            zip.write_all(&data).unwrap();
        }
        let bytes = zip.finish().unwrap().into_inner();

        let mut reader = ArchiveReader::from_bytes(bytes).unwrap();
        let report = reader.verify_all();
        assert!(!report.is_ok());
        assert_eq!(report.failures, vec!["experiments/5/data.txt".to_string()]);
        assert_eq!(report.unlisted, vec!["experiments/5/extra.bin".to_string()]);
        assert!(report.manifest_last);
    }
}
