//! Binary-level tests: configuration validation and exit codes

use std::process::{Command, Output};
use tempfile::NamedTempFile;

const CONFIG_VARS: [&str; 7] = [
    "KUMA_URL",
    "KUMA_USER",
    "KUMA_PASS",
    "SENTINEL_NAME",
    "GROUP_TO_PAUSE",
    "TAG_TO_SUPPRESS",
    "INTERVAL_MS",
];

fn sentinel(args: &[&str], vars: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kuma-sentinel"));
    for var in CONFIG_VARS {
        cmd.env_remove(var);
    }
    cmd.env_remove("RUST_LOG").env_remove("LOG_LEVEL").env("NO_COLOR", "1");
    cmd.args(args).envs(vars.iter().copied());
    cmd.output().expect("binary runs")
}

#[test]
fn test_check_config_defaults() {
    let output = sentinel(&["--check-config"], &[("KUMA_PASS", "hunter2")]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout.contains("Kuma URL: http://localhost:3001/"));
    assert!(stdout.contains("Sentinel Monitor: INTERNET-SENTINEL"));
    assert!(stdout.contains("Group to Pause: Sentinel"));
    assert!(stdout.contains("Password: *******"));
    assert!(!stdout.contains("hunter2"));
}

#[test]
fn test_conflicting_targets_exit_code() {
    let output = sentinel(
        &["--check-config"],
        &[("GROUP_TO_PAUSE", "Sentinel"), ("TAG_TO_SUPPRESS", "wan")],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("GROUP_TO_PAUSE and TAG_TO_SUPPRESS"));
}

#[test]
fn test_empty_variable_exit_code() {
    let output = sentinel(&["--check-config"], &[("KUMA_USER", "")]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("KUMA_USER is required"));
}

#[test]
fn test_invalid_url_exit_code() {
    let output = sentinel(&["--check-config"], &[("KUMA_URL", "localhost:3001")]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid KUMA_URL format"));
}

#[test]
fn test_log_file_receives_json_lines() {
    let log = NamedTempFile::new().unwrap();
    let path = log.path().to_str().unwrap().to_string();

    let output = sentinel(&["--check-config", "--log-file", &path], &[]);
    assert_eq!(output.status.code(), Some(0));

    let contents = std::fs::read_to_string(log.path()).unwrap();
    let first = contents.lines().next().expect("at least one log line");
    let parsed: serde_json::Value = serde_json::from_str(first).unwrap();
    assert_eq!(parsed["level"], "INFO");
    assert!(contents.contains("Configuration OK"));
}
