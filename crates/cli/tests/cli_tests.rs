//! CLI integration tests

use std::io::Write;
use std::process::{Command, Output};

/// Run the binary with an isolated home directory and no URL from the environment
fn gpuhub(args: &[&str]) -> Output {
    let home = tempfile::tempdir().expect("Failed to create temp home");
    Command::new(env!("CARGO_BIN_EXE_gpuhub"))
        .args(args)
        .env("HOME", home.path())
        .env_remove("GPUHUB_API_URL")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = gpuhub(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("GPU telemetry hub"), "Should show app description");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("history"), "Should show history command");
    assert!(stdout.contains("summary"), "Should show summary command");
    assert!(stdout.contains("push"), "Should show push command");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = gpuhub(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("gpuhub"), "Should show binary name");
}

/// Test status subcommand help
#[test]
fn test_status_help() {
    let output = gpuhub(&["status", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Status help should succeed");
    assert!(stdout.contains("--agent"), "Should show agent option");
    assert!(stdout.contains("--online-only"), "Should show online-only option");
}

/// Test history subcommand help
#[test]
fn test_history_help() {
    let output = gpuhub(&["history", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "History help should succeed");
    assert!(stdout.contains("--last"), "Should show last option");
}

/// Test that history requires an agent
#[test]
fn test_history_requires_agent() {
    let output = gpuhub(&["history"]);
    assert!(!output.status.success(), "History without agent should fail");
}

/// Test invalid format is rejected
#[test]
fn test_invalid_format() {
    let output = gpuhub(&["--format", "yaml", "summary"]);
    assert!(!output.status.success(), "Unknown format should fail");
}

/// Test push sends the file, with the agent override applied
#[test]
fn test_push_against_hub() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/api/update")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"agentName": "renamed"}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"status":"success","message":"Data updated"}"#)
        .create();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"agentName": "gpu-box-1", "devices": [{{"index": 0, "memory_used": "1 MiB", "memory_total": "2 MiB"}}]}}"#
    )
    .unwrap();

    let url = server.url();
    let path = file.path().to_str().unwrap();
    let output = gpuhub(&["--api-url", &url, "push", path, "--agent", "renamed"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Push should succeed: {:?}", output);
    assert!(stdout.contains("Data updated"));
    mock.assert();
}

/// Test a rejected snapshot surfaces the hub's message and fails
#[test]
fn test_push_rejected_by_hub() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/api/update")
        .with_status(400)
        .with_body(r#"{"status":"error","message":"duplicate device index 0 in snapshot from x"}"#)
        .create();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"agentName": "x", "devices": [{{"index": 0}}, {{"index": 0}}]}}"#).unwrap();

    let url = server.url();
    let output = gpuhub(&["--api-url", &url, "push", file.path().to_str().unwrap()]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Rejected push should fail");
    assert!(stderr.contains("duplicate device index"));
}

/// Test summary renders fleet counters as JSON
#[test]
fn test_summary_json() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/api/summary")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"totalAgents":2,"onlineAgents":1,"offlineAgents":1,"onlineDevices":4,"uptimeSecs":90}"#,
        )
        .create();

    let url = server.url();
    let output = gpuhub(&["--api-url", &url, "--format", "json", "summary"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Summary should succeed: {:?}", output);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["onlineDevices"], 4);
}

/// Test the URL is read from the config file when no flag or env is given
#[test]
fn test_api_url_from_config_file() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/api/summary")
        .with_status(200)
        .with_body(
            r#"{"totalAgents":0,"onlineAgents":0,"offlineAgents":0,"onlineDevices":0,"uptimeSecs":1}"#,
        )
        .create();

    let home = tempfile::tempdir().unwrap();
    let config_dir = home.path().join(".config").join("gpuhub");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.json"),
        format!(r#"{{"api_url": "{}"}}"#, server.url()),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_gpuhub"))
        .arg("summary")
        .env("HOME", home.path())
        .env_remove("GPUHUB_API_URL")
        .env("NO_COLOR", "1")
        .output()
        .unwrap();

    assert!(output.status.success(), "Summary should succeed: {:?}", output);
    mock.assert();
}
