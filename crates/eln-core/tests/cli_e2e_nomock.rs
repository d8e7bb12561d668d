//! CLI end-to-end tests for eln-export.
//!
//! These run the real binary against a directory store written to a temp dir
//! and check stdout payloads, stderr error reports and exit codes.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a Command for the eln-export binary with a clean config environment.
///
/// Logging is switched off so stderr carries only the error report.
fn eln_export() -> Command {
    let mut cmd = Command::cargo_bin("eln-export").expect("eln-export binary should exist");
    cmd.env_remove("ELN_EXPORT_CONFIG")
        .env("ELN_EXPORT_CONFIG_DIR", "/nonexistent/eln-export")
        .env("ELN_LOG", "off")
        .env_remove("RUST_LOG");
    cmd
}

/// Store with one team (id 1), one member (id 5), two experiments and a resource.
fn write_store(root: &Path) {
    fs::create_dir_all(root.join("uploads/exp")).unwrap();
    fs::write(root.join("uploads/exp/trace.csv"), "t,v\n0,1.5\n1,1.7\n").unwrap();
    fs::write(root.join("uploads/exp/photo.jpg"), vec![0xFFu8; 2048]).unwrap();
    fs::write(root.join("uploads/sop.md"), "# Buffer prep\n").unwrap();

    let index = serde_json::json!({
        "teams": [
            {"id": 1, "name": "Enzymology", "orgid": "ROR-123", "members": [5]}
        ],
        "experiments": [
            {
                "id": 21, "team_id": 1, "owner_id": 5,
                "title": "Kinetics run", "created_at": "2024-05-02T10:00:00Z",
                "author": "Lin Wei", "tags": ["kinetics"],
                "attachments": [
                    {"filename": "trace.csv", "path": "exp/trace.csv"},
                    {"filename": "photo.jpg", "path": "exp/photo.jpg"}
                ]
            },
            {
                "id": 22, "team_id": 1, "owner_id": 5,
                "title": "Control", "created_at": "2024-05-03T10:00:00Z",
                "author": "Lin Wei"
            }
        ],
        "resources": [
            {
                "id": 4, "team_id": 1,
                "title": "Buffer SOP", "created_at": "2024-01-10T08:00:00Z",
                "author": "Sam Ortiz",
                "attachments": [{"filename": "sop.md", "path": "sop.md"}]
            }
        ]
    });
    fs::write(
        root.join("index.json"),
        serde_json::to_string_pretty(&index).unwrap(),
    )
    .unwrap();
}

struct Fixture {
    _dir: TempDir,
    store: PathBuf,
    out: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store");
    let out = dir.path().join("out");
    write_store(&store);
    Fixture {
        _dir: dir,
        store,
        out,
    }
}

fn run_export(fx: &Fixture, extra: &[&str]) -> Value {
    let output = eln_export()
        .args(["export", "5", "1", "--store"])
        .arg(&fx.store)
        .arg("--output-dir")
        .arg(&fx.out)
        .args(extra)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "export failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn error_json(stderr: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stderr);
    let start = text.find('{').expect("error JSON on stderr");
    let end = text.rfind('}').expect("error JSON on stderr");
    serde_json::from_str(&text[start..=end]).unwrap()
}

// ============================================================================
// export
// ============================================================================

mod export {
    use super::*;

    #[test]
    fn export_reports_archive_and_counts() {
        let fx = fixture();
        let json = run_export(&fx, &[]);

        assert_eq!(json["status"], "ok");
        assert_eq!(json["records"], 3);
        let archive = PathBuf::from(json["archive"].as_str().unwrap());
        assert!(archive.exists());
        assert!(archive.starts_with(&fx.out));
        let name = archive.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("export-") && name.ends_with("-userid-5.eln"));
    }

    #[test]
    fn skip_resources_excludes_resource_entries() {
        let fx = fixture();
        let json = run_export(&fx, &["--skip-resources"]);
        assert_eq!(json["records"], 2);

        let file = fs::File::open(json["archive"].as_str().unwrap()).unwrap();
        let archive = zip::ZipArchive::new(file).unwrap();
        assert!(archive.file_names().any(|n| n == "experiments/21/trace.csv"));
        assert!(archive.file_names().all(|n| !n.starts_with("resources/")));
    }

    #[test]
    fn export_then_verify_succeeds() {
        let fx = fixture();
        let json = run_export(&fx, &[]);
        let archive = json["archive"].as_str().unwrap();

        eln_export()
            .args(["verify", archive])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"status\": \"ok\""));
    }

    #[test]
    fn human_format_prints_summary_line() {
        let fx = fixture();
        eln_export()
            .args(["-f", "human", "export", "5", "1", "--store"])
            .arg(&fx.store)
            .arg("--output-dir")
            .arg(&fx.out)
            .assert()
            .success()
            .stdout(predicate::str::starts_with("Exported 3 records"));
    }

    #[test]
    fn non_member_is_not_found() {
        let fx = fixture();
        let output = eln_export()
            .args(["export", "6", "1", "--store"])
            .arg(&fx.store)
            .arg("--output-dir")
            .arg(&fx.out)
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(11));
        let json = error_json(&output.stderr);
        assert_eq!(json["error"]["kind"], "not_found");
        assert!(!fx.out.exists() || fs::read_dir(&fx.out).unwrap().count() == 0);
    }

    #[test]
    fn non_positive_ids_are_invalid_request() {
        let fx = fixture();
        let output = eln_export()
            .args(["export", "--store"])
            .arg(&fx.store)
            .args(["--", "0", "1"])
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(10));
        assert_eq!(error_json(&output.stderr)["error"]["kind"], "invalid_request");
    }

    #[test]
    fn empty_export_follows_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");
        fs::create_dir_all(&store).unwrap();
        fs::write(
            store.join("index.json"),
            r#"{"teams": [{"id": 2, "name": "New team", "members": [9]}]}"#,
        )
        .unwrap();

        eln_export()
            .args(["export", "9", "2", "--reject-empty", "--store"])
            .arg(&store)
            .arg("--output-dir")
            .arg(dir.path().join("rejected"))
            .assert()
            .code(11);

        eln_export()
            .args(["export", "9", "2", "--allow-empty", "--store"])
            .arg(&store)
            .arg("--output-dir")
            .arg(dir.path().join("allowed"))
            .assert()
            .success()
            .stdout(predicate::str::contains("\"records\": 0"));
    }

    #[test]
    fn missing_upload_is_content_failure_without_output() {
        let fx = fixture();
        fs::remove_file(fx.store.join("uploads/exp/photo.jpg")).unwrap();

        let output = eln_export()
            .args(["export", "5", "1", "--store"])
            .arg(&fx.store)
            .arg("--output-dir")
            .arg(&fx.out)
            .output()
            .unwrap();

        assert!(!output.status.success());
        let json = error_json(&output.stderr);
        assert_eq!(json["error"]["slug"], "experiment:21");
        let leftovers = fs::read_dir(&fx.out).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn missing_store_option_is_rejected() {
        eln_export()
            .args(["export", "5", "1"])
            .assert()
            .code(10)
            .stderr(predicate::str::contains("no record store"));
    }

    #[test]
    fn conflicting_empty_flags_fail() {
        eln_export()
            .args(["export", "5", "1", "--allow-empty", "--reject-empty"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }
}

// ============================================================================
// verify
// ============================================================================

mod verify {
    use super::*;

    #[test]
    fn tampered_archive_fails_verification() {
        let fx = fixture();
        let json = run_export(&fx, &[]);
        let archive = PathBuf::from(json["archive"].as_str().unwrap());

        // Rewrite the archive with one entry's content changed.
        let source = fs::File::open(&archive).unwrap();
        let mut reader = zip::ZipArchive::new(source).unwrap();
        let tampered = fx.out.join("tampered.eln");
        let mut writer = zip::ZipWriter::new(fs::File::create(&tampered).unwrap());
        for i in 0..reader.len() {
            let mut entry = reader.by_index(i).unwrap();
            let name = entry.name().to_string();
            let mut content = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut content).unwrap();
            if name == "experiments/21/trace.csv" {
                content.extend_from_slice(b"2,9.9\n");
            }
            writer
                .start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            std::io::Write::write_all(&mut writer, &content).unwrap();
        }
        writer.finish().unwrap();

        let output = eln_export()
            .args(["verify"])
            .arg(&tampered)
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(13));
        let report: Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["status"], "failed");
        assert_eq!(
            report["report"]["failures"],
            serde_json::json!(["experiments/21/trace.csv"])
        );
    }

    #[test]
    fn non_archive_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.eln");
        fs::write(&bogus, "not a zip").unwrap();

        eln_export()
            .args(["verify"])
            .arg(&bogus)
            .assert()
            .code(13);
    }

    #[test]
    fn missing_archive_is_io_error() {
        eln_export()
            .args(["verify", "/nonexistent/archive.eln"])
            .assert()
            .code(21);
    }
}

// ============================================================================
// config
// ============================================================================

mod config {
    use super::*;

    #[test]
    fn show_defaults() {
        let output = eln_export()
            .args(["config", "show"])
            .env("XDG_CONFIG_HOME", "/nonexistent/xdg")
            .env("HOME", "/nonexistent/home")
            .output()
            .unwrap();
        assert!(output.status.success());

        let json: Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["schema_version"], "1.0.0");
        assert_eq!(json["effective"]["chunk_size"], 65536);
    }

    #[test]
    fn show_reports_cli_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        fs::write(&path, r#"{"empty_policy": "reject", "chunk_size": 4096}"#).unwrap();

        let output = eln_export()
            .args(["config", "show", "--config"])
            .arg(&path)
            .output()
            .unwrap();
        assert!(output.status.success());

        let json: Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["source"], "CLI argument");
        assert_eq!(json["effective"]["empty_policy"], "reject");
        assert_eq!(json["effective"]["chunk_size"], 4096);
        assert_eq!(json["hash"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn invalid_config_exits_with_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        fs::write(&path, r#"{"chunk_size": 12}"#).unwrap();

        eln_export()
            .args(["config", "validate"])
            .arg(&path)
            .assert()
            .code(12)
            .stderr(predicate::str::contains("chunk_size"));
    }

    #[test]
    fn missing_cli_config_is_config_error() {
        eln_export()
            .args(["export", "5", "1", "--config", "/nonexistent/export.json"])
            .assert()
            .code(12);
    }

    #[test]
    fn unknown_subcommand_fails() {
        eln_export()
            .args(["config", "nonexistent"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }
}
