//! Structured logging for eln-export.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for scripted exports
//!
//! stdout is reserved for command payloads; all log output goes to stderr.
//! Each export runs inside a span carrying its `run_id`.

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events are shown at the configured level.
const LOG_TARGETS: [&str; 4] = ["eln_core", "eln_archive", "eln_config", "eln_export"];

/// Initialize the logging subsystem.
///
/// Call once at startup. Returns `false` if a global subscriber was already
/// installed.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = match std::env::var(config::ENV_LOG) {
        Ok(_) => default_filter(config.level),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.level)),
    };

    match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .is_ok()
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init()
                .is_ok()
        }
    }
}

fn default_filter(level: LogLevel) -> EnvFilter {
    let directives = LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::new(directives)
}

/// Generate a unique run ID for one export.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &uuid[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_run_id() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();

        assert!(id1.starts_with("run-"));
        assert_ne!(id1, id2);
        // run-<12 hex chars>
        assert_eq!(id1.len(), 16);
        assert!(id1[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_default_filter_covers_workspace_crates() {
        let filter = default_filter(LogLevel::Debug).to_string();
        assert!(filter.contains("eln_core=debug"));
        assert!(filter.contains("eln_archive=debug"));
    }
}
