#![cfg(all(unix, feature = "cli"))]

use std::process::{Command, Output};

use tempfile::TempDir;

const CLI_BIN: &str = env!("CARGO_BIN_EXE_parasite");
const ECHO_BIN: &str = env!("CARGO_BIN_EXE_parasite-echo");

fn plugin_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    std::fs::copy(ECHO_BIN, dir.path().join("echo")).expect("plugin binary should copy");
    std::fs::write(dir.path().join("README.txt"), "not a plugin").expect("readme should write");
    dir
}

fn parasite(args: &[&str]) -> Output {
    Command::new(CLI_BIN)
        .args(["--log-level", "error"])
        .args(args)
        .env_remove("PARASITE_HOST_NAME")
        .env_remove("PARASITE_HOST_VERSION")
        .output()
        .expect("parasite should run")
}

/// Runs the CLI with JSON logs at info, so plugin records show up on stderr.
fn parasite_logging(args: &[&str]) -> Output {
    Command::new(CLI_BIN)
        .args(["--log-level", "info", "--log-format", "json"])
        .args(args)
        .env_remove("PARASITE_HOST_NAME")
        .env_remove("PARASITE_HOST_VERSION")
        .env_remove("PARASITE_ECHO_LOG_LEVEL")
        .output()
        .expect("parasite should run")
}

fn path_arg(dir: &TempDir) -> &str {
    dir.path().to_str().expect("temp path should be utf-8")
}

#[test]
fn call_prints_raw_reply() {
    let dir = plugin_dir();
    let output = parasite(&[
        "--format",
        "raw",
        "call",
        path_arg(&dir),
        "echo",
        "upper",
        "--data",
        "hello",
    ]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(output.stdout, b"HELLO");
}

#[test]
fn call_prints_json_reply() {
    let dir = plugin_dir();
    let output = parasite(&[
        "--format",
        "json",
        "call",
        path_arg(&dir),
        "echo",
        "echo",
        "--json",
        "{\"n\":1}",
    ]);

    assert!(output.status.success());
    let reply: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reply["plugin"], "echo");
    assert_eq!(reply["call"], "echo");
    assert_eq!(reply["payload"], "{\"n\":1}");
    assert_eq!(reply["payload_size"], 7);
}

#[test]
fn plugin_logs_are_forwarded_to_host_stderr() {
    let dir = plugin_dir();
    let output = parasite_logging(&[
        "--format",
        "raw",
        "call",
        path_arg(&dir),
        "echo",
        "echo",
        "--data",
        "hi",
    ]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(output.stdout, b"hi");

    let stderr = String::from_utf8_lossy(&output.stderr);
    let forwarded: Vec<serde_json::Value> = stderr
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .filter(|line| line["fields"]["message"] == "[echo] echo")
        .collect();
    assert_eq!(forwarded.len(), 1, "stderr was: {stderr}");

    let record = &forwarded[0];
    assert_eq!(record["level"], "INFO");
    assert_eq!(record["fields"]["plugin"], "echo");
    assert!(record["fields"]["plugin_caller"]
        .as_str()
        .unwrap()
        .contains("parasite-echo.rs:"));
    let attributes: serde_json::Value =
        serde_json::from_str(record["fields"]["fields"].as_str().unwrap()).unwrap();
    assert_eq!(attributes["bytes"], 2);
}

#[test]
fn call_unknown_plugin_is_usage_error() {
    let dir = plugin_dir();
    let output = parasite(&["call", path_arg(&dir), "ghost", "echo"]);

    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ghost"));
}

#[test]
fn call_rejected_by_plugin_times_out() {
    let dir = plugin_dir();
    let output = parasite(&[
        "call",
        path_arg(&dir),
        "echo",
        "echo",
        "--host-name",
        "other-host",
        "--stale-after",
        "300ms",
        "--reap-interval",
        "50ms",
    ]);

    assert_ne!(output.status.code(), Some(0));
}

#[test]
fn list_shows_only_executables() {
    let dir = plugin_dir();
    let output = parasite(&["--format", "json", "list", path_arg(&dir)]);

    assert!(output.status.success());
    let plugins: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = plugins
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["echo"]);
}

#[test]
fn list_missing_dir_fails() {
    let dir = plugin_dir();
    let missing = dir.path().join("missing");
    let output = parasite(&["list", missing.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn handshake_then_verify() {
    let output = parasite(&[
        "--format",
        "raw",
        "handshake",
        "--host-name",
        "editor",
        "--host-version",
        "2.1",
    ]);
    assert!(output.status.success());
    let blob = String::from_utf8(output.stdout).unwrap();
    let blob = blob.trim();

    let accepted = parasite(&[
        "verify-handshake",
        blob,
        "--expect-host",
        "editor",
        "--min-version",
        "2.0",
    ]);
    assert!(accepted.status.success());

    let too_old = parasite(&[
        "verify-handshake",
        blob,
        "--expect-host",
        "editor",
        "--min-version",
        "2.2",
    ]);
    assert_eq!(too_old.status.code(), Some(1));

    let wrong_host = parasite(&[
        "verify-handshake",
        blob,
        "--expect-host",
        "viewer",
        "--min-version",
        "1",
    ]);
    assert_eq!(wrong_host.status.code(), Some(1));
}

#[test]
fn version_prints_package_version() {
    let output = parasite(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("parasite "));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}
