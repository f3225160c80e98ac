//! Configuration system tests
//!
//! Tests configuration loading, validation, and environment overrides
//! through the binary

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Test fixture for configuration testing
struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

fn validate(fixture: &ConfigFixture) -> assert_cmd::assert::Assert {
    Command::cargo_bin("pulsoid-osc-bridge")
        .unwrap()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
}

fn show(fixture: &ConfigFixture) -> Command {
    let mut cmd = Command::cargo_bin("pulsoid-osc-bridge").unwrap();
    cmd.args(["config", "show", "--config", fixture.path()]);
    cmd
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_empty_config_uses_defaults() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    validate(&fixture).success();
    show(&fixture)
        .assert()
        .success()
        .stdout(predicate::str::contains("wss://dev.pulsoid.net/api/v1/data/real_time"))
        .stdout(predicate::str::contains("port = 9000"))
        .stdout(predicate::str::contains("PulsoidConnected"));
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[stream]
url = "wss://stream.example.com/real_time"
connect_timeout_ms = 5000
ping_interval_secs = 15
ping_timeout_secs = 5

[reconnect]
initial_delay_ms = 500
max_delay_ms = 10000
multiplier = 1.5
max_attempts = 8

[osc]
host = "192.168.1.20"
port = 9001
parameter_prefix = "/avatar/parameters/"
status_parameter = "BridgeAlive"
keepalive_interval_secs = 10

[auth]
client_id = "my-client"
token_file = "/tmp/pulsoid-token.txt"

[logging]
level = "debug"
file = "/tmp/bridge.log"
max_file_size_mb = 50
max_files = 3
json_format = true
"#,
    );

    validate(&fixture).success();
    show(&fixture)
        .assert()
        .success()
        .stdout(predicate::str::contains("192.168.1.20"))
        .stdout(predicate::str::contains("9001"))
        .stdout(predicate::str::contains("BridgeAlive"))
        .stdout(predicate::str::contains("max_attempts = 8"));
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_stream_url() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[stream]
url = "https://not-websocket.example.com"
"#,
    );

    validate(&fixture)
        .code(10)
        .stderr(predicate::str::contains("ws://"));
}

#[test]
fn test_zero_max_attempts() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[reconnect]
max_attempts = 0
"#,
    );

    validate(&fixture)
        .failure()
        .stderr(predicate::str::contains("max_attempts"));
}

#[test]
fn test_initial_delay_above_max() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[reconnect]
initial_delay_ms = 60000
max_delay_ms = 1000
"#,
    );

    validate(&fixture).failure();
}

#[test]
fn test_zero_osc_port() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[osc]
port = 0
"#,
    );

    validate(&fixture).failure();
}

#[test]
fn test_invalid_log_level() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[logging]
level = "invalid_level"
"#,
    );

    validate(&fixture).failure();
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[stream
url = "wss://example.com"
"#,
    );

    validate(&fixture)
        .code(10)
        .stderr(predicate::str::contains("E101"));
}

// ─────────────────────────────────────────────────────────────────
// Config Init Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_init_creates_valid_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("new_config.toml");

    Command::cargo_bin("pulsoid-osc-bridge")
        .unwrap()
        .args(["config", "init", "--path", config_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file created"));

    assert!(config_path.exists());
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[osc]"));
    assert!(content.contains("max_attempts = 5"));
}

#[test]
fn test_config_init_force_overwrite() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[osc]\nstatus_parameter = \"OldName\"\n");

    Command::cargo_bin("pulsoid-osc-bridge")
        .unwrap()
        .args(["config", "init", "--path", fixture.path(), "--force"])
        .assert()
        .success();

    let content = fs::read_to_string(fixture.path()).unwrap();
    assert!(!content.contains("OldName"));
}

// ─────────────────────────────────────────────────────────────────
// Environment Variable Override Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_overrides_file() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[osc]
host = "10.0.0.1"
port = 9001
"#,
    );

    show(&fixture)
        .env("PULSOID_BRIDGE_OSC_HOST", "10.0.0.2")
        .env("PULSOID_BRIDGE_OSC_PORT", "9123")
        .env("PULSOID_BRIDGE_MAX_RECONNECT_ATTEMPTS", "9")
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.2"))
        .stdout(predicate::str::contains("9123"))
        .stdout(predicate::str::contains("max_attempts = 9"))
        .stdout(predicate::str::contains("10.0.0.1").not());
}

#[test]
fn test_env_override_is_validated() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    Command::cargo_bin("pulsoid-osc-bridge")
        .unwrap()
        .args(["config", "validate", "--config", fixture.path()])
        .env("PULSOID_BRIDGE_STREAM_URL", "ftp://example.com")
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────
// Path Expansion Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_tilde_expansion() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[auth]
token_file = "~/pulsoid/token.txt"
"#,
    );

    let output = show(&fixture).assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    assert!(!stdout.contains("token_file = \"~"));
    assert!(stdout.contains("pulsoid/token.txt"));
}
