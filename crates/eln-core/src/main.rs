//! eln-export - streaming notebook export
//!
//! The command-line entry point, handling:
//! - Export of a user's records in a team into an `.eln` archive
//! - Verification of an existing archive against its manifest
//! - Inspection and validation of the export configuration
//!
//! Command payloads go to stdout; logs and error reports go to stderr.

use clap::{Args, Parser, Subcommand};
use eln_archive::{ArchiveError, ArchiveReader};
use eln_common::{ExportRequest, OutputFormat, SCHEMA_VERSION};
use eln_config::{load_config, ConfigSnapshot, EmptyExportPolicy, LoadedConfig, ValidationError};
use eln_core::exit_codes::ExitCode;
use eln_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use eln_core::{export_to_dir, CancellationToken, DirectoryStore, ExportError, ExportOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Export lab-notebook records into self-describing archives
#[derive(Parser)]
#[command(name = "eln-export")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to the export configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Cancel the operation after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a user's records in a team
    Export(ExportArgs),

    /// Check an archive against its manifest
    Verify(VerifyArgs),

    /// Inspect the export configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Owner (user) id
    owner_id: i64,

    /// Team id
    team_id: i64,

    /// Leave the team's resources out of the archive
    #[arg(long)]
    skip_resources: bool,

    /// Directory receiving the archive (defaults to config, then cwd)
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Record store directory (defaults to config)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Write an archive even when no records match
    #[arg(long, conflicts_with = "reject_empty")]
    allow_empty: bool,

    /// Fail when no records match
    #[arg(long)]
    reject_empty: bool,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Archive to verify
    archive: PathBuf,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration and where it came from
    Show,

    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the resolved config)
        path: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let cli_level = (cli.global.verbose > 0 || cli.global.quiet)
        .then(|| LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet));
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let exit_code = match &cli.command {
        Commands::Export(args) => run_export(&cli.global, args),
        Commands::Verify(args) => run_verify(&cli.global, args),
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => run_config_show(&cli.global),
            ConfigCommands::Validate { path } => run_config_validate(&cli.global, path.as_deref()),
        },
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// export
// ============================================================================

fn run_export(global: &GlobalOpts, args: &ExportArgs) -> ExitCode {
    let loaded = match load_config(global.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => return output_config_error(global, &e),
    };
    let config = &loaded.config;

    let mut options = ExportOptions::from_config(config);
    if args.allow_empty {
        options = options.with_empty_policy(EmptyExportPolicy::Allow);
    } else if args.reject_empty {
        options = options.with_empty_policy(EmptyExportPolicy::Reject);
    }

    let Some(store_dir) = args.store.clone().or_else(|| config.store_dir.clone()) else {
        return output_message_error(
            global,
            ExitCode::InvalidRequest,
            "no record store given (use --store or set store_dir in the config)",
        );
    };
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output_dir_or_cwd());

    let store = match DirectoryStore::open(&store_dir) {
        Ok(store) => store,
        Err(e) => return output_export_error(global, &ExportError::from(e)),
    };

    let cancel = CancellationToken::new();
    if let Err(e) = cancel.cancel_on_interrupt() {
        warn!(error = %e, "Could not install interrupt handler");
    }
    if let Some(secs) = global.timeout {
        spawn_deadline(cancel.clone(), Duration::from_secs(secs));
    }

    let request = ExportRequest::new(args.owner_id, args.team_id, !args.skip_resources);
    match export_to_dir(&store, &store, options, &request, &output_dir, cancel) {
        Ok(summary) => {
            match global.format {
                OutputFormat::Json => {
                    let response = serde_json::json!({
                        "schema_version": SCHEMA_VERSION,
                        "status": "ok",
                        "run_id": summary.run_id,
                        "generated_at": summary.generated_at.to_rfc3339(),
                        "archive": summary.location.display().to_string(),
                        "records": summary.records,
                        "entries": summary.entries,
                        "bytes": summary.bytes,
                    });
                    print_json(&response);
                }
                OutputFormat::Human => {
                    println!(
                        "Exported {} records ({} bytes) to {}",
                        summary.records,
                        summary.bytes,
                        summary.location.display()
                    );
                }
            }
            ExitCode::Ok
        }
        Err(e) => output_export_error(global, &e),
    }
}

/// Cancel `token` once `after` has elapsed.
fn spawn_deadline(token: CancellationToken, after: Duration) {
    let spawned = thread::Builder::new()
        .name("eln-export-deadline".to_string())
        .spawn(move || {
            thread::sleep(after);
            warn!(timeout_secs = after.as_secs(), "Time limit reached, cancelling");
            token.cancel();
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Could not start deadline thread; --timeout ignored");
    }
}

fn output_export_error(global: &GlobalOpts, error: &ExportError) -> ExitCode {
    let exit_code = ExitCode::from(error.kind());
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "status": "error",
                "exit_code": exit_code.as_i32(),
                "error": error.to_json(),
            });
            eprint_json(&response);
        }
        OutputFormat::Human => {
            eprintln!("Export failed: {}", error);
        }
    }
    exit_code
}

// ============================================================================
// verify
// ============================================================================

fn run_verify(global: &GlobalOpts, args: &VerifyArgs) -> ExitCode {
    let mut reader = match ArchiveReader::open(&args.archive) {
        Ok(reader) => reader,
        Err(e) => {
            let exit_code = match e {
                ArchiveError::Io(_) => ExitCode::IoError,
                _ => ExitCode::VerifyFailed,
            };
            return output_message_error(
                global,
                exit_code,
                &format!("cannot open {}: {}", args.archive.display(), e),
            );
        }
    };

    let report = reader.verify_all();
    let exit_code = if report.is_ok() {
        ExitCode::Ok
    } else {
        ExitCode::VerifyFailed
    };

    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "status": if report.is_ok() { "ok" } else { "failed" },
                "archive": args.archive.display().to_string(),
                "records": reader.records().len(),
                "report": report,
            });
            print_json(&response);
        }
        OutputFormat::Human => {
            println!(
                "{}: {} verified, {} failed, {} missing, {} unlisted",
                args.archive.display(),
                report.verified.len(),
                report.failures.len(),
                report.missing.len(),
                report.unlisted.len()
            );
            for failure in &report.failures {
                println!("  checksum mismatch: {}", failure);
            }
            for missing in &report.missing {
                println!("  missing: {}", missing);
            }
        }
    }
    exit_code
}

// ============================================================================
// config
// ============================================================================

fn run_config_show(global: &GlobalOpts) -> ExitCode {
    let loaded = match load_config(global.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => return output_config_error(global, &e),
    };
    let snapshot = ConfigSnapshot::new(&loaded);

    match global.format {
        OutputFormat::Json => match serde_json::to_value(&snapshot) {
            Ok(value) => print_json(&value),
            Err(e) => {
                return output_message_error(global, ExitCode::InternalError, &e.to_string())
            }
        },
        OutputFormat::Human => print_config_human(&loaded),
    }
    ExitCode::Ok
}

fn print_config_human(loaded: &LoadedConfig) {
    let config = &loaded.config;
    println!("# eln-export config");
    println!();
    match &loaded.path {
        Some(path) => println!("Source: {} ({})", path.display(), loaded.source),
        None => println!("Source: **built-in defaults**"),
    }
    println!("Empty exports: {}", config.empty_policy);
    println!("Chunk size: {} bytes", config.chunk_size);
    println!("Output directory: {}", config.output_dir_or_cwd().display());
    if let Some(store) = &config.store_dir {
        println!("Store directory: {}", store.display());
    }
}

fn run_config_validate(global: &GlobalOpts, path: Option<&Path>) -> ExitCode {
    let path = path.or(global.config.as_deref());
    match load_config(path) {
        Ok(loaded) => {
            let location = loaded
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in defaults".to_string());
            match global.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "schema_version": SCHEMA_VERSION,
                    "status": "valid",
                    "path": loaded.path.as_ref().map(|p| p.display().to_string()),
                    "source": loaded.source.to_string(),
                    "hash": loaded.hash,
                })),
                OutputFormat::Human => println!("{}: valid", location),
            }
            ExitCode::Ok
        }
        Err(e) => output_config_error(global, &e),
    }
}

fn output_config_error(global: &GlobalOpts, error: &ValidationError) -> ExitCode {
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "status": "error",
                "exit_code": ExitCode::ConfigError.as_i32(),
                "error": {
                    "kind": "config",
                    "code": error.code(),
                    "message": error.to_string(),
                }
            });
            eprint_json(&response);
        }
        OutputFormat::Human => {
            eprintln!("# Configuration Error");
            eprintln!();
            eprintln!("Error: {}", error);
        }
    }
    ExitCode::ConfigError
}

// ============================================================================
// output helpers
// ============================================================================

fn output_message_error(global: &GlobalOpts, exit_code: ExitCode, message: &str) -> ExitCode {
    match global.format {
        OutputFormat::Json => eprint_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "status": "error",
            "exit_code": exit_code.as_i32(),
            "error": {
                "kind": exit_code.code_name(),
                "message": message,
            }
        })),
        OutputFormat::Human => eprintln!("Error: {}", message),
    }
    exit_code
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("cannot render output: {}", e),
    }
}

fn eprint_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => eprintln!("{}", text),
        Err(e) => eprintln!("cannot render error: {}", e),
    }
}
