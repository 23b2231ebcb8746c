//! Integration tests for the broker CLI.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn broker() -> Command {
    let mut cmd = Command::cargo_bin("broker").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("BROKER_MODAL__QUIET_INTERVAL_MS")
        .env_remove("BROKER_MODAL__WAIT_TIMEOUT_MS")
        .env_remove("BROKER_DISPATCH__TICK_INTERVAL_MS");
    cmd
}

#[test]
fn test_config_prints_defaults() {
    broker()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[modal]"))
        .stdout(predicate::str::contains("quiet_interval_ms = 1500"))
        .stdout(predicate::str::contains("tick_interval_ms = 50"));
}

#[test]
fn test_config_reads_file_and_environment() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[modal]\nquiet_interval_ms = 200\nwait_timeout_ms = 60000").unwrap();

    broker()
        .arg("--config")
        .arg(file.path())
        .arg("config")
        .env("BROKER_DISPATCH__TICK_INTERVAL_MS", "10")
        .assert()
        .success()
        .stdout(predicate::str::contains("quiet_interval_ms = 200"))
        .stdout(predicate::str::contains("wait_timeout_ms = 60000"))
        .stdout(predicate::str::contains("tick_interval_ms = 10"));
}

#[test]
fn test_config_missing_file_fails() {
    broker()
        .args(["--config", "/nonexistent/broker.toml", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_config_rejects_zero_tick() {
    broker()
        .arg("config")
        .env("BROKER_DISPATCH__TICK_INTERVAL_MS", "0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("tick_interval_ms"));
}

#[test]
fn test_simulate_json_summary() {
    let output = broker()
        .args([
            "simulate",
            "--sessions",
            "3",
            "--rounds",
            "2",
            "--quiet-interval-ms",
            "0",
            "--answer-delay-ms",
            "1",
            "--json",
        ])
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(summary["sessions"], 3);
    assert_eq!(summary["dialogues_answered"], 12);
    assert_eq!(summary["menu_callbacks"], 6);
    assert_eq!(summary["dispatch"]["menu_choices"], 6);
    assert_eq!(summary["dispatch"]["failures"], 0);
    // Every menu picks "Delete", which asks for a full redraw
    assert_eq!(summary["follow_ups"], 6);
}

#[test]
fn test_simulate_human_output() {
    broker()
        .args(["simulate", "--sessions", "2", "--rounds", "1", "--quiet-interval-ms", "0"])
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .success()
        .stdout(predicate::str::contains("Modal Broker Simulation"))
        .stdout(predicate::str::contains("Dialogues answered"));
}

#[test]
fn test_help_lists_commands() {
    broker()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("config"));
}
