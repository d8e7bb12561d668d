//! eln-export configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust struct for export.json
//! - Config resolution (CLI → env → XDG → /etc → defaults)
//! - Semantic validation
//! - Config snapshots for diagnostics (`config show`)

pub mod export;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use export::{ArchiveCompression, EmptyExportPolicy, ExportConfig};
pub use resolve::{load_config, resolve_config_path, ConfigSearch, ConfigSource, LoadedConfig};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
