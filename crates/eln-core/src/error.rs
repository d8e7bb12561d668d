//! Export errors.
//!
//! Every failure is fatal to the export it occurs in. Errors carry the slug of
//! the record being processed when there is one, and serialize to a structured
//! JSON object for the CLI.

use crate::store::StoreError;
use eln_archive::ArchiveError;
use eln_common::{Slug, ValidationError};
use serde::Serialize;
use thiserror::Error;

/// Classification of export failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    ArchiveState,
    SinkFailure,
    ContentFailure,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ArchiveState => "archive_state",
            ErrorKind::SinkFailure => "sink_failure",
            ErrorKind::ContentFailure => "content_failure",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error("{what} not found")]
    NotFound { what: String, slug: Option<Slug> },

    #[error("archive state violation: {message}")]
    ArchiveState { message: String, slug: Option<Slug> },

    #[error("output sink failed: {source}")]
    SinkFailure {
        #[source]
        source: ArchiveError,
        slug: Option<Slug>,
    },

    #[error("content failure: {message}")]
    ContentFailure { message: String, slug: Option<Slug> },

    #[error("export cancelled")]
    Cancelled { slug: Option<Slug> },
}

impl ExportError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ExportError::NotFound {
            what: what.into(),
            slug: None,
        }
    }

    pub fn content(message: impl Into<String>) -> Self {
        ExportError::ContentFailure {
            message: message.into(),
            slug: None,
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        ExportError::ArchiveState {
            message: message.into(),
            slug: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ExportError::NotFound { .. } => ErrorKind::NotFound,
            ExportError::ArchiveState { .. } => ErrorKind::ArchiveState,
            ExportError::SinkFailure { .. } => ErrorKind::SinkFailure,
            ExportError::ContentFailure { .. } => ErrorKind::ContentFailure,
            ExportError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// The record being processed when the error occurred.
    pub fn slug(&self) -> Option<&Slug> {
        match self {
            ExportError::InvalidRequest(_) => None,
            ExportError::NotFound { slug, .. }
            | ExportError::ArchiveState { slug, .. }
            | ExportError::SinkFailure { slug, .. }
            | ExportError::ContentFailure { slug, .. }
            | ExportError::Cancelled { slug } => slug.as_ref(),
        }
    }

    /// Attach the offending slug unless one is already recorded.
    pub fn with_slug(mut self, record: Slug) -> Self {
        match &mut self {
            ExportError::InvalidRequest(_) => {}
            ExportError::NotFound { slug, .. }
            | ExportError::ArchiveState { slug, .. }
            | ExportError::SinkFailure { slug, .. }
            | ExportError::ContentFailure { slug, .. }
            | ExportError::Cancelled { slug } => {
                if slug.is_none() {
                    *slug = Some(record);
                }
            }
        }
        self
    }

    /// Structured form for machine-readable output.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
            "slug": self.slug().map(|s| s.to_string()),
        })
    }
}

impl From<ArchiveError> for ExportError {
    fn from(err: ArchiveError) -> Self {
        if err.is_state_violation() {
            ExportError::ArchiveState {
                message: err.to_string(),
                slug: None,
            }
        } else {
            ExportError::SinkFailure {
                source: err,
                slug: None,
            }
        }
    }
}

impl From<StoreError> for ExportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ExportError::NotFound { what, slug: None },
            other => ExportError::ContentFailure {
                message: other.to_string(),
                slug: None,
            },
        }
    }
}

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;
    use eln_common::TeamId;

    #[test]
    fn test_archive_error_classification() {
        let state: ExportError = ArchiveError::DuplicatePath("a".to_string()).into();
        assert_eq!(state.kind(), ErrorKind::ArchiveState);

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let sink: ExportError = ArchiveError::Io(io).into();
        assert_eq!(sink.kind(), ErrorKind::SinkFailure);
    }

    #[test]
    fn test_store_error_classification() {
        let missing: ExportError = StoreError::NotFound("experiment:3".to_string()).into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let unsafe_path: ExportError = StoreError::UnsafePath("../x".to_string()).into();
        assert_eq!(unsafe_path.kind(), ErrorKind::ContentFailure);
    }

    #[test]
    fn test_with_slug_keeps_first() {
        let first = Slug::experiment(1, TeamId(1));
        let second = Slug::experiment(2, TeamId(1));
        let err = ExportError::content("boom").with_slug(first).with_slug(second);
        assert_eq!(err.slug(), Some(&first));
    }

    #[test]
    fn test_invalid_request_has_no_slug() {
        let err = ExportError::from(ValidationError::MissingField("owner_id".to_string()))
            .with_slug(Slug::resource(1, TeamId(1)));
        assert!(err.slug().is_none());
    }

    #[test]
    fn test_to_json() {
        let err = ExportError::Cancelled {
            slug: Some(Slug::resource(9, TeamId(2))),
        };
        let json = err.to_json();
        assert_eq!(json["kind"], "cancelled");
        assert_eq!(json["slug"], "resource:9");
        assert_eq!(json["message"], "export cancelled");
    }
}
