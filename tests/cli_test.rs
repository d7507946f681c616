use std::net::TcpListener;

use assert_cmd::Command;
use predicates::prelude::*;

fn portlens() -> Command {
    Command::cargo_bin("portlens").unwrap()
}

/// A port that nothing listens on right now.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

// ---------------------------------------------------------------------------
// Argument handling
// ---------------------------------------------------------------------------

#[test]
fn test_help_lists_commands() {
    portlens()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("describe"))
        .stdout(predicate::str::contains("kill"))
        .stdout(predicate::str::contains("--host"));
}

#[test]
fn test_kill_needs_a_target() {
    portlens()
        .arg("kill")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--pid").or(predicate::str::contains("--port")));
}

#[test]
fn test_kill_rejects_both_targets() {
    portlens()
        .args(["kill", "--pid", "1", "--port", "80"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_interval_below_minimum_rejected() {
    portlens()
        .args(["-s", "0.05", "describe", "80"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("0.1"));
}

#[test]
fn test_bad_host_spec_rejected() {
    portlens()
        .args(["-H", "ops@box:99999", "describe", "22"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid port"));
}

// ---------------------------------------------------------------------------
// Local one-shots
// ---------------------------------------------------------------------------

#[test]
fn test_describe_unused_port_fails() {
    let port = free_port();
    portlens()
        .args(["describe", &port.to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No listener"));
}

#[test]
fn test_describe_own_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    portlens()
        .args(["describe", &port.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{}/TCP", port)))
        .stdout(predicate::str::contains("SOURCE    localhost"));
    drop(listener);
}

#[test]
fn test_kill_unknown_pid_fails_without_signalling() {
    portlens()
        .args(["kill", "--pid", "4000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no process found for PID 4000000000"));
}

#[test]
fn test_log_file_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("portlens.log");
    let port = free_port();

    portlens()
        .args(["--log-file", log.to_str().unwrap(), "describe", &port.to_string()])
        .env("RUST_LOG", "debug")
        .assert()
        .failure();

    let contents = std::fs::read_to_string(&log).unwrap();
    assert!(contents.contains("scan"), "log was: {}", contents);
}
