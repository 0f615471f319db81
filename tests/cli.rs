//! Integration tests for the rankwatch binary.

mod common;

use std::fs;
use std::process::{Command, Output};

use common::{frames, parse_rows};
use tempfile::TempDir;

/// Run rankwatch with the given arguments, returning the full Output.
fn run_rankwatch(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rankwatch"))
        .args(args)
        .output()
        .expect("Failed to run rankwatch")
}

#[test]
fn test_list_names_every_job() {
    let output = run_rankwatch(&["list"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["mutual-ssend", "mutual-recv", "deserter", "all-states", "pipeline"] {
        assert!(stdout.contains(name), "missing {} in:\n{}", name, stdout);
    }
}

#[test]
fn test_pipeline_exits_cleanly() {
    let output = run_rankwatch(&[
        "run",
        "pipeline",
        "--workers",
        "3",
        "--messages",
        "50",
        "--refresh-hz",
        "50",
        "--no-clear",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(!stdout.contains('\x1b'));

    let last = frames(&stdout).pop().expect("at least one frame");
    let rows = parse_rows(&last);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.what == "Finalize"));
}

#[test]
fn test_clear_screen_by_default() {
    let output = run_rankwatch(&["run", "pipeline", "--messages", "5"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("\x1b[2J\x1b[1;1H"));
}

#[test]
fn test_too_few_workers_fails() {
    let output = run_rankwatch(&["run", "all-states", "--workers", "3"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("at least 8"), "stderr: {}", stderr);
}

#[test]
fn test_rejects_zero_refresh_rate() {
    let output = run_rankwatch(&["run", "pipeline", "--refresh-hz", "0"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("refresh rate"), "stderr: {}", stderr);
}

#[test]
fn test_rejects_refresh_rate_too_low_for_a_duration() {
    let output = run_rankwatch(&["run", "pipeline", "--messages", "5", "--refresh-hz", "1e-20"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("refresh rate"), "stderr: {}", stderr);
    assert!(!stderr.contains("panicked"), "stderr: {}", stderr);
}

#[test]
fn test_config_file_is_applied() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("monitor.json");
    fs::write(&path, r#"{ "clear_screen": false, "refresh_hz": 40.0 }"#).unwrap();

    let output = run_rankwatch(&[
        "run",
        "pipeline",
        "--messages",
        "5",
        "--config",
        path.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert!(!String::from_utf8_lossy(&output.stdout).contains('\x1b'));
}

#[test]
fn test_bad_config_file_fails() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("monitor.json");
    fs::write(&path, "not json").unwrap();

    let output = run_rankwatch(&["run", "pipeline", "--config", path.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to parse config"), "stderr: {}", stderr);
}
