//! Configuration snapshots for diagnostics.
//!
//! A snapshot captures the effective configuration and where it came from, so
//! an export can be reproduced later with the same settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::export::ExportConfig;
use crate::resolve::LoadedConfig;

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Path the config was loaded from.
    #[serde(default)]
    pub path: Option<String>,

    /// Source of the configuration.
    pub source: String,

    /// SHA-256 hash of the config file content.
    #[serde(default)]
    pub hash: Option<String>,

    /// Effective values.
    pub effective: ExportConfig,
}

impl ConfigSnapshot {
    pub fn new(loaded: &LoadedConfig) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            path: loaded.path.as_ref().map(|p| p.display().to_string()),
            source: loaded.source.to_string(),
            hash: loaded.hash.clone(),
            effective: loaded.config.clone(),
        }
    }
}
