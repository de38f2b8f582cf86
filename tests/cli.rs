use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("memopt").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

/// MEMORY.md plus one old daily note that repeats an entry and still
/// claims live status.
fn fixture() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::write(
        root.join("MEMORY.md"),
        "# Memory\n\n## Practices\n\n- use exponential backoff for retries\n- keep secrets in the vault\n",
    )
    .unwrap();
    fs::create_dir(root.join("memory")).unwrap();
    fs::write(
        root.join("memory/2020-01-01-notes.md"),
        "# Notes\n\n- use exponential backoff for retries.\n- current: migrate auth service\n",
    )
    .unwrap();
    tmp
}

fn notes(root: &Path) -> PathBuf {
    root.join("memory/2020-01-01-notes.md")
}

#[test]
fn analyze_missing_workspace_fails() {
    let tmp = TempDir::new().unwrap();
    cmd()
        .args(["analyze"])
        .arg(tmp.path().join("absent"))
        .assert()
        .failure()
        .stderr(contains("workspace not found"));
}

#[test]
fn analyze_empty_workspace() {
    let tmp = TempDir::new().unwrap();
    cmd()
        .arg("analyze")
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(contains("No memory files found"));
}

#[test]
fn analyze_json() {
    let tmp = fixture();
    let out = cmd()
        .args(["analyze", "--json"])
        .arg(tmp.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&out).expect("valid json output");
    assert_eq!(value["stats"]["files_scanned"], 2);
    assert_eq!(value["stats"]["duplicates"], 1);
    assert_eq!(value["stats"]["stale_entries"], 1);
    // 100 - 3 - 2 + 5 + 5, clamped
    assert_eq!(value["score"], 100);
    assert_eq!(value["issues"][0]["severity"], "critical");
}

#[test]
fn analyze_markdown_to_file() {
    let tmp = fixture();
    let report = tmp.path().join("report.md");
    cmd()
        .args(["analyze", "--output"])
        .arg(&report)
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(contains("Report saved to"));

    let text = fs::read_to_string(&report).unwrap();
    assert!(text.contains("# Memory Optimization Report"));
    assert!(text.contains("1 duplicate entries found"));
}

#[test]
fn optimize_dry_run_changes_nothing() {
    let tmp = fixture();
    let before = fs::read_to_string(notes(tmp.path())).unwrap();

    cmd()
        .arg("optimize")
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(contains("Would remove 1 duplicate entries"))
        .stdout(contains("[DRY RUN] Would modify:"))
        .stdout(contains("This was a dry run"));

    assert_eq!(fs::read_to_string(notes(tmp.path())).unwrap(), before);
}

#[test]
fn optimize_archives_stale_items() {
    let tmp = fixture();
    cmd()
        .args(["optimize", "--apply", "--only", "stale"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(contains("Archived 1 stale entries"));

    let text = fs::read_to_string(notes(tmp.path())).unwrap();
    assert!(text.contains("- [ARCHIVED] current: migrate auth service"));
    assert!(text.contains("- use exponential backoff for retries."));
}

#[test]
fn optimize_dedup_twice_is_idempotent() {
    let tmp = fixture();
    cmd()
        .args(["optimize", "--apply", "--backup", "--only", "dedup"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(contains("Removed 1 duplicate entries"));

    let text = fs::read_to_string(notes(tmp.path())).unwrap();
    assert_eq!(text, "# Notes\n\n- current: migrate auth service\n");
    assert!(tmp.path().join("memory/2020-01-01-notes.md.bak").exists());

    cmd()
        .args(["optimize", "--apply", "--only", "dedup"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(contains("No duplicates to remove"));
    assert_eq!(fs::read_to_string(notes(tmp.path())).unwrap(), text);
}

#[test]
fn bad_config_is_fatal() {
    let tmp = fixture();
    fs::write(tmp.path().join(".memopt.toml"), "stale_days = 0\n").unwrap();
    cmd()
        .arg("analyze")
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(contains("stale_days"));
}

#[test]
fn relative_config_path_is_taken_from_current_dir() {
    let tmp = fixture();
    let cwd = TempDir::new().unwrap();
    fs::write(cwd.path().join("my.toml"), "stale_days = 0\n").unwrap();

    // The workspace copy would load fine; the current-dir copy is invalid.
    fs::write(tmp.path().join("my.toml"), "stale_days = 30\n").unwrap();

    cmd()
        .current_dir(cwd.path())
        .args(["analyze", "--config", "my.toml"])
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(contains("stale_days"));
}
