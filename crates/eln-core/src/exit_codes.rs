//! Exit codes for the eln-export CLI.
//!
//! Exit codes communicate operation outcome without requiring output parsing.
//!
//! Exit code ranges:
//! - 0-9: Success/operational outcomes
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal or I/O errors

use crate::error::ErrorKind;

/// Exit codes for eln-export operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Ok = 0,

    /// Export cancelled (timeout or signal); no archive written
    Cancelled = 6,

    /// Invalid arguments or identifiers
    InvalidRequest = 10,

    /// Team, membership or record not found
    NotFound = 11,

    /// Configuration file missing, unreadable or invalid
    ConfigError = 12,

    /// Archive failed verification
    VerifyFailed = 13,

    /// Record content could not be read
    ContentError = 14,

    /// Internal error (writer protocol violated)
    InternalError = 20,

    /// Output sink error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Ok
    }

    /// Codes 10-19: resolvable by the user.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Ok => "OK",
            ExitCode::Cancelled => "ERR_CANCELLED",
            ExitCode::InvalidRequest => "ERR_INVALID_REQUEST",
            ExitCode::NotFound => "ERR_NOT_FOUND",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::VerifyFailed => "ERR_VERIFY",
            ExitCode::ContentError => "ERR_CONTENT",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ErrorKind> for ExitCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidRequest => ExitCode::InvalidRequest,
            ErrorKind::NotFound => ExitCode::NotFound,
            ErrorKind::ArchiveState => ExitCode::InternalError,
            ErrorKind::SinkFailure => ExitCode::IoError,
            ErrorKind::ContentFailure => ExitCode::ContentError,
            ErrorKind::Cancelled => ExitCode::Cancelled,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
