//! Typed export configuration (export.json).

use crate::validate::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default read size when streaming attachment content.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const MIN_CHUNK_SIZE: usize = 1024;
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// What to do when an export request selects no records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyExportPolicy {
    /// Produce a valid archive containing only the manifest.
    #[default]
    Allow,
    /// Fail with a not-found error before the sink is opened.
    Reject,
}

impl fmt::Display for EmptyExportPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyExportPolicy::Allow => write!(f, "allow"),
            EmptyExportPolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Entry compression setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    #[default]
    Deflated,
    Stored,
}

/// Export configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub schema_version: String,

    /// Directory archives are written to. Defaults to the working directory.
    pub output_dir: Option<PathBuf>,

    /// Directory-backed record store.
    pub store_dir: Option<PathBuf>,

    pub empty_policy: EmptyExportPolicy,

    /// Bytes read from an attachment per chunk.
    pub chunk_size: usize,

    /// Upper bound on a single blocking read from an attachment.
    pub read_timeout_secs: Option<u64>,

    /// Upper bound on the time spent streaming one record.
    pub record_timeout_secs: Option<u64>,

    pub compression: ArchiveCompression,

    /// Name of the root dataset in the manifest.
    pub archive_title: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            output_dir: None,
            store_dir: None,
            empty_policy: EmptyExportPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout_secs: None,
            record_timeout_secs: None,
            compression: ArchiveCompression::default(),
            archive_title: None,
        }
    }
}

impl ExportConfig {
    /// Load from a JSON file. Does not validate; see [`crate::validate_config`].
    pub fn from_file(path: &Path) -> ValidationResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ValidationError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> ValidationResult<Self> {
        serde_json::from_str(json).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    pub fn record_timeout(&self) -> Option<Duration> {
        self.record_timeout_secs.map(Duration::from_secs)
    }

    /// Output directory, falling back to the current directory.
    pub fn output_dir_or_cwd(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExportConfig::default();
        assert_eq!(config.chunk_size, 64 * 1024);
        assert_eq!(config.empty_policy, EmptyExportPolicy::Allow);
        assert_eq!(config.compression, ArchiveCompression::Deflated);
        assert!(config.read_timeout().is_none());
        assert_eq!(config.output_dir_or_cwd(), PathBuf::from("."));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = ExportConfig::from_json_str(
            r#"{"empty_policy": "reject", "read_timeout_secs": 5, "compression": "stored"}"#,
        )
        .unwrap();
        assert_eq!(config.empty_policy, EmptyExportPolicy::Reject);
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.compression, ArchiveCompression::Stored);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.schema_version, crate::CONFIG_SCHEMA_VERSION);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ExportConfig::from_json_str(r#"{"chunk": 10}"#).unwrap_err();
        assert!(matches!(err, ValidationError::ParseError(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ExportConfig::from_file(Path::new("/nonexistent/export.json")).unwrap_err();
        assert!(matches!(err, ValidationError::IoError(_)));
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(EmptyExportPolicy::Allow.to_string(), "allow");
        assert_eq!(EmptyExportPolicy::Reject.to_string(), "reject");
    }
}
