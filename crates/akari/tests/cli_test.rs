//! Integration tests for the `akari` CLI binary.
//!
//! Argument handling runs without any device; the device-facing cases run
//! the binary against a wiremock server standing in for the firmware.
#![allow(clippy::unwrap_used)]

use std::io::Write;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `akari` binary with env isolation.
///
/// Clears all `AKARI_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn akari_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("akari");
    cmd.env("HOME", "/tmp/akari-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/akari-cli-test-nonexistent")
        .env_remove("AKARI_ENTRY")
        .env_remove("AKARI_CONFIG")
        .env_remove("AKARI_OUTPUT")
        .env_remove("AKARI_API_KEY")
        .env_remove("AKARI_BROKER")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

fn against(server: &MockServer, args: &[&str]) -> assert_cmd::Command {
    let addr = server.address();
    let port = addr.port().to_string();
    let mut cmd = akari_cmd();
    cmd.args(["--host", &addr.ip().to_string(), "--port", &port, "--timeout", "2"])
        .args(args);
    cmd
}

fn health_body() -> serde_json::Value {
    json!({
        "cpu_temp_c": 48.3,
        "ram_used_bytes": 200_000_000u64,
        "ram_total_bytes": 1_000_000_000u64,
        "uptime_seconds": 7200,
        "modules": { "mqtt": true, "modbus": false }
    })
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = akari_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    akari_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("health")
            .and(predicate::str::contains("config"))
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    akari_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("akari"));
}

#[test]
fn test_completions_zsh() {
    akari_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_bash() {
    akari_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Argument errors ─────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = akari_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("foobar"));
}

#[test]
fn test_invalid_output_format() {
    let output = akari_cmd()
        .args(["--output", "xml", "--host", "127.0.0.1", "health"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("possible values"));
}

#[test]
fn test_host_conflicts_with_entry() {
    akari_cmd()
        .args(["--entry", "garage", "--host", "10.0.0.2", "health"])
        .assert()
        .code(2);
}

#[test]
fn test_config_set_needs_a_body() {
    akari_cmd()
        .args(["--host", "127.0.0.1", "config", "set", "modbus"])
        .assert()
        .code(2);
}

#[test]
fn test_no_target_without_entries() {
    akari_cmd()
        .arg("health")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No target"));
}

#[test]
fn test_unknown_entry() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[entries.zona-giorno]\nhost = \"127.0.0.1\"").unwrap();

    akari_cmd()
        .args(["--config", file.path().to_str().unwrap(), "--entry", "cantina", "health"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("zona-giorno"));
}

#[test]
fn test_invalid_config_value_names_the_field() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[defaults]\nfailure_threshold = 0").unwrap();

    akari_cmd()
        .args(["--config", file.path().to_str().unwrap(), "--host", "127.0.0.1", "health"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("defaults.failure_threshold"));
}

#[test]
fn test_invalid_section_fails_before_any_request() {
    // Port 9 (discard) would refuse or hang; the section check comes first.
    akari_cmd()
        .args(["--host", "127.0.0.1", "--port", "9", "config", "get", "wifi"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("modbus"));
}

// ── Against a device ────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_health_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(health_body()))
        .mount(&server)
        .await;

    let output = run(against(&server, &["-o", "json", "health"])).await;
    assert!(output.status.success(), "{}", combined_output(&output));

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["uptime_seconds"], 7200);
    assert_eq!(value["module_status"]["modbus"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(health_body()))
        .mount(&server)
        .await;

    let output = run(against(&server, &["health"])).await;
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("48.3"));
    assert!(stdout.contains("2h 0m"));
    assert!(stdout.contains("DOWN"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_config_get_plain() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config/modbus"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "port": "/dev/ttyUSB0", "baudrate": 9600 })),
        )
        .mount(&server)
        .await;

    let output = run(against(&server, &["-o", "plain", "config", "get", "modbus"])).await;
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("baudrate=9600"));
    assert!(stdout.contains("port=/dev/ttyUSB0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_config_set_reports_restart() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/config/modbus"))
        .and(body_json(json!({ "baudrate": 19200 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "restart_required": true })))
        .expect(1)
        .mount(&server)
        .await;

    let output = run(against(
        &server,
        &["config", "set", "modbus", "--data", r#"{"baudrate":19200}"#],
    ))
    .await;
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", combined_output(&output));
    assert!(stdout.contains("Restart required"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_section_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config/covers"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "no covers configured" })))
        .mount(&server)
        .await;

    let output = run(against(&server, &["config", "get", "covers"])).await;
    assert_eq!(output.status.code(), Some(5));
    assert!(combined_output(&output).contains("no covers configured"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_api_key_sent_and_refused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/restart"))
        .and(header("Authorization", "Bearer wrong"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let output = run(against(&server, &["--api-key", "wrong", "restart"])).await;
    assert_eq!(output.status.code(), Some(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_devices_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "relay1", "name": "Luce cucina", "type": "relay", "state": "on" },
            { "id": "cover1", "name": "Tapparella sud", "type": "cover" }
        ])))
        .mount(&server)
        .await;

    let output = run(against(&server, &["-o", "plain", "devices"])).await;
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "relay1\ncover1\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_probe_unreachable() {
    // Bind then drop a listener to get a port nothing answers on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port().to_string()
    };
    let mut cmd = akari_cmd();
    cmd.args(["--host", "127.0.0.1", "--port", &port, "--timeout", "2", "probe"]);

    let output = run(cmd).await;
    assert_eq!(output.status.code(), Some(7));
}
