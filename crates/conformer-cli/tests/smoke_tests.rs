//! Smoke tests for the conformer CLI
//!
//! These tests drive the built binary against the embedded suites.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command for the conformer binary
fn conformer() -> Command {
    let mut cmd = Command::cargo_bin("conformer").expect("conformer binary should exist");
    cmd.env_remove("CONFORMER_CONFIG").env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    conformer()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    conformer()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("worker"));
}

#[test]
fn test_no_args_shows_help() {
    conformer().assert().failure(); // Requires a subcommand
}

// ============================================================================
// List Tests
// ============================================================================

#[test]
fn test_list_unittests() {
    conformer()
        .args(["list", "unittests:*"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unittests:logging:stacks_capped:"))
        .stdout(predicate::str::contains(
            "unittests:params_builder_and_utils:stringify_round_trip:index=4",
        ));
}

#[test]
fn test_list_single_file() {
    conformer()
        .args(["list", "demo:outcomes:*"])
        .assert()
        .success()
        .stdout(predicate::str::contains("demo:outcomes:fails:"))
        .stdout(predicate::str::contains("buffer").not());
}

#[test]
fn test_list_unknown_suite() {
    conformer()
        .args(["list", "webgpu:*"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown suite: webgpu"));
}

#[test]
fn test_list_invalid_query() {
    conformer()
        .args(["list", "unittests"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

// ============================================================================
// Run Tests
// ============================================================================

#[test]
fn test_run_unittests_succeeds() {
    conformer()
        .args(["--color", "never", "run", "unittests:*"])
        .assert()
        .success()
        .stderr(predicate::str::contains("PASSED"));
}

#[test]
fn test_run_demo_fails() {
    conformer()
        .args(["--color", "never", "run", "demo:*"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FAIL demo:outcomes:fails:"))
        .stderr(predicate::str::contains("EXPECTATION FAILED: 1 + 1 should be 3"));
}

#[test]
fn test_run_quiet_still_reports_failures() {
    conformer()
        .args(["-q", "--color", "never", "run", "demo:outcomes:*"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FAIL demo:outcomes:fails:"))
        .stderr(predicate::str::contains("PASS demo:outcomes:passes:").not());
}

#[test]
fn test_run_json_format() {
    let output = conformer()
        .args(["-q", "run", "demo:outcomes:passes:", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["results"][0][0], "demo:outcomes:passes:");
    assert_eq!(doc["results"][0][1]["status"], "pass");
}

#[test]
fn test_run_with_expectations_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("expectations.json");
    fs::write(
        &path,
        r#"[{"query": "demo:outcomes:fails:*", "expectation": "fail"}]"#,
    )
    .unwrap();

    conformer()
        .args(["--color", "never", "run", "demo:outcomes:*", "--expectations"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn test_run_fail_fast() {
    conformer()
        .args(["--color", "never", "run", "demo:outcomes:*", "--fail-fast"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("stopped at first failure"))
        .stderr(predicate::str::contains("demo:outcomes:later:").not());
}

#[test]
fn test_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conformer.yaml");
    fs::write(&path, "format: Json\nverbosity: Quiet\n").unwrap();

    let output = conformer()
        .arg("--config")
        .arg(&path)
        .args(["run", "demo:outcomes:passes:"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(doc["version"].is_string());
}

// ============================================================================
// Worker Tests
// ============================================================================

#[test]
fn test_worker_via_stdin() {
    let output = conformer()
        .arg("worker")
        .write_stdin(r#"{"query": "demo:outcomes:warns:"}"#)
        .output()
        .unwrap();
    assert!(output.status.success());
    let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["query"], "demo:outcomes:warns:");
    assert_eq!(response["result"]["status"], "warn");
}

#[test]
fn test_worker_rejects_multi_case_query() {
    conformer()
        .arg("worker")
        .write_stdin(r#"{"query": "demo:*"}"#)
        .assert()
        .failure();
}
