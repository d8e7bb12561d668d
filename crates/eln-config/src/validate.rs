//! Configuration validation errors and semantic validation.

use crate::export::{ExportConfig, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use thiserror::Error;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

/// Validate export configuration semantically.
pub fn validate_config(config: &ExportConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&config.chunk_size) {
        return Err(ValidationError::InvalidValue {
            field: "chunk_size".to_string(),
            message: format!(
                "Must be in [{}, {}], got {}",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, config.chunk_size
            ),
        });
    }

    validate_timeout("read_timeout_secs", config.read_timeout_secs)?;
    validate_timeout("record_timeout_secs", config.record_timeout_secs)?;

    if let (Some(read), Some(record)) = (config.read_timeout_secs, config.record_timeout_secs) {
        if read > record {
            return Err(ValidationError::SemanticError(format!(
                "read_timeout_secs ({}) exceeds record_timeout_secs ({})",
                read, record
            )));
        }
    }

    if let Some(title) = &config.archive_title {
        if title.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "archive_title".to_string(),
                message: "Must not be blank".to_string(),
            });
        }
    }

    for (field, dir) in [("output_dir", &config.output_dir), ("store_dir", &config.store_dir)] {
        if let Some(dir) = dir {
            if dir.as_os_str().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: field.to_string(),
                    message: "Must not be empty".to_string(),
                });
            }
        }
    }

    Ok(())
}

fn validate_timeout(field: &str, secs: Option<u64>) -> ValidationResult<()> {
    if secs == Some(0) {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: "Must be positive".to_string(),
        });
    }
    Ok(())
}
