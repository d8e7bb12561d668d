//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG path →
//! system path → built-in defaults.

use crate::export::ExportConfig;
use crate::validate::{validate_config, ValidationError, ValidationResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the configuration file was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/eln-export/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "ELN_EXPORT_CONFIG";
pub const ENV_CONFIG_DIR: &str = "ELN_EXPORT_CONFIG_DIR";

/// Standard config file name.
pub const CONFIG_FILENAME: &str = "export.json";

/// Application name for XDG directories.
const APP_NAME: &str = "eln-export";

/// Candidate locations, in priority order.
#[derive(Debug, Clone, Default)]
pub struct ConfigSearch {
    pub cli_path: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
    pub env_dir: Option<PathBuf>,
    pub xdg_dir: Option<PathBuf>,
    pub system_dir: Option<PathBuf>,
}

impl ConfigSearch {
    /// Candidates from the process environment and standard directories.
    pub fn from_env(cli_path: Option<&Path>) -> Self {
        ConfigSearch {
            cli_path: cli_path.map(Path::to_path_buf),
            env_path: std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from),
            env_dir: std::env::var_os(ENV_CONFIG_DIR).map(PathBuf::from),
            xdg_dir: xdg_config_dir(),
            system_dir: Some(system_config_dir()),
        }
    }

    /// Pick the first candidate that applies.
    ///
    /// An explicit CLI path is always chosen, even if missing, so that a typo
    /// surfaces as a load error instead of silently falling back.
    pub fn resolve(&self) -> (Option<PathBuf>, ConfigSource) {
        if let Some(path) = &self.cli_path {
            return (Some(path.clone()), ConfigSource::CliArgument);
        }

        if let Some(path) = &self.env_path {
            if path.exists() {
                return (Some(path.clone()), ConfigSource::Environment);
            }
        }

        if let Some(dir) = &self.env_dir {
            let path = dir.join(CONFIG_FILENAME);
            if path.exists() {
                return (Some(path), ConfigSource::Environment);
            }
        }

        if let Some(dir) = &self.xdg_dir {
            let path = dir.join(CONFIG_FILENAME);
            if path.exists() {
                return (Some(path), ConfigSource::XdgConfig);
            }
        }

        if let Some(dir) = &self.system_dir {
            let path = dir.join(CONFIG_FILENAME);
            if path.exists() {
                return (Some(path), ConfigSource::SystemConfig);
            }
        }

        (None, ConfigSource::BuiltinDefault)
    }

    /// Resolve, read, parse and validate.
    pub fn load(&self) -> ValidationResult<LoadedConfig> {
        let (path, source) = self.resolve();

        let Some(path) = path else {
            debug!("No config file found, using built-in defaults");
            return Ok(LoadedConfig {
                config: ExportConfig::default(),
                path: None,
                source,
                hash: None,
            });
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| ValidationError::IoError(format!("{}: {}", path.display(), e)))?;
        let config = ExportConfig::from_json_str(&content)?;
        validate_config(&config)?;

        debug!(path = %path.display(), source = %source, "Loaded config");

        Ok(LoadedConfig {
            config,
            hash: Some(hash_content(&content)),
            path: Some(path),
            source,
        })
    }
}

/// A validated configuration and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ExportConfig,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
    /// SHA-256 of the file content; `None` for built-in defaults.
    pub hash: Option<String>,
}

/// Resolve the configuration path using the standard resolution order.
///
/// 1. Explicit CLI path
/// 2. `ELN_EXPORT_CONFIG`
/// 3. `ELN_EXPORT_CONFIG_DIR` + `export.json`
/// 4. XDG config directory (`~/.config/eln-export/`)
/// 5. System config (`/etc/eln-export/`)
/// 6. Built-in defaults (None)
pub fn resolve_config_path(cli_path: Option<&Path>) -> (Option<PathBuf>, ConfigSource) {
    ConfigSearch::from_env(cli_path).resolve()
}

/// Resolve and load the configuration for this process.
pub fn load_config(cli_path: Option<&Path>) -> ValidationResult<LoadedConfig> {
    ConfigSearch::from_env(cli_path).load()
}

/// Get the XDG config directory for eln-export.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
