//! End-to-end tests for the `taskwright` binary, exercised through the
//! compiled executable rather than the library API.

use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

fn taskwright_cmd(projects_root: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("taskwright"));
    cmd.arg("--projects-root").arg(projects_root);
    cmd
}

#[test]
fn status_on_missing_project_fails_with_exit_one() {
    let dir = TempDir::new().unwrap();
    taskwright_cmd(dir.path())
        .args(["status", "demo"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("project not found"));
}

#[test]
fn doctor_reports_failure_with_no_enabled_llms() {
    let dir = TempDir::new().unwrap();
    taskwright_cmd(dir.path())
        .arg("doctor")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("enabled-llms"));
}

#[test]
fn config_show_lists_source_attribution() {
    let dir = TempDir::new().unwrap();
    taskwright_cmd(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("runner.max_concurrent = default"));
}

#[test]
fn json_flag_emits_parseable_json_for_doctor() {
    let dir = TempDir::new().unwrap();
    let output = taskwright_cmd(dir.path())
        .args(["--json", "doctor"])
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(parsed["ok"], false);
}
