//! End-to-end tests running the binary
//!
//! mock Pulsoid stream → pulsoid-osc-bridge → local OSC receiver

mod common;

use std::process::{Child, Command, Stdio};
use std::sync::atomic::Ordering;
use std::time::Duration;

use rosc::{OscMessage, OscType};

use common::{refusing_endpoint, IsolatedConfig, MockPulsoid, OscReceiver};

const STATUS: &str = "/avatar/parameters/PulsoidConnected";

/// Kills the bridge when the test ends, pass or fail
struct BridgeProcess(Child);

impl Drop for BridgeProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_bridge(config: &IsolatedConfig, stream_url: &str, osc_port: u16) -> BridgeProcess {
    let child = Command::new(assert_cmd::cargo::cargo_bin("pulsoid-osc-bridge"))
        .args(["--quiet", "run", "--config", &config.config_path(), "--token", "e2e-token"])
        .env("PULSOID_BRIDGE_STREAM_URL", stream_url)
        .env("PULSOID_BRIDGE_OSC_PORT", osc_port.to_string())
        .env("PULSOID_BRIDGE_KEEPALIVE_SECS", "3600")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start bridge");
    BridgeProcess(child)
}

fn float(msg: &OscMessage) -> f32 {
    match msg.args.as_slice() {
        [OscType::Float(f)] => *f,
        other => panic!("expected one float, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readings_are_forwarded_as_osc() {
    let server = MockPulsoid::start(vec![72, 75]).await;
    let receiver = OscReceiver::bind().await;
    let config = IsolatedConfig::new();

    let _bridge = spawn_bridge(&config, &server.ws_url(), receiver.port());

    let mut status = Vec::new();
    let mut readings = Vec::new();
    while readings.len() < 14 {
        let msg = receiver.recv().await;
        if msg.addr == STATUS {
            status.push(msg);
        } else {
            readings.push(msg);
        }
    }

    assert!(!status.is_empty());
    assert!(status.iter().all(|m| m.args == vec![OscType::Bool(true)]));
    assert_eq!(server.auth_headers(), vec!["Bearer e2e-token".to_string()]);

    let (first, second) = readings.split_at(7);
    let names: Vec<_> = first.iter().map(|m| m.addr.trim_start_matches("/avatar/parameters/")).collect();
    assert_eq!(
        names,
        [
            "Heartrate",
            "HeartRateFloat",
            "Heartrate2",
            "HeartRateFloat01",
            "Heartrate3",
            "HeartRateInt",
            "HeartBeatToggle"
        ]
    );

    assert!((float(&first[0]) - (-0.4331)).abs() < 1e-4);
    assert!((float(&first[1]) - (-0.4331)).abs() < 1e-4);
    assert!((float(&first[2]) - 0.2824).abs() < 1e-4);
    assert!((float(&first[3]) - 0.2824).abs() < 1e-4);
    assert_eq!(first[4].args, vec![OscType::Int(72)]);
    assert_eq!(first[5].args, vec![OscType::Int(72)]);
    assert_eq!(first[6].args, vec![OscType::Bool(false)]);

    assert_eq!(second[4].args, vec![OscType::Int(75)]);
    assert_eq!(second[6].args, vec![OscType::Bool(true)]);
    assert_eq!(server.connections(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exhausted_reconnects_exit_with_error() {
    let (url, attempts) = refusing_endpoint().await;
    let receiver = OscReceiver::bind().await;
    let config = IsolatedConfig::new();
    let port = receiver.port();
    let config_path = config.config_path();

    let assert = tokio::task::spawn_blocking(move || {
        assert_cmd::Command::cargo_bin("pulsoid-osc-bridge")
            .unwrap()
            .args(["run", "--config", &config_path, "--token", "e2e-token"])
            .env("PULSOID_BRIDGE_STREAM_URL", url)
            .env("PULSOID_BRIDGE_OSC_PORT", port.to_string())
            .env("PULSOID_BRIDGE_RECONNECT_INITIAL_MS", "10")
            .env("PULSOID_BRIDGE_RECONNECT_MAX_MS", "40")
            .env("PULSOID_BRIDGE_MAX_RECONNECT_ATTEMPTS", "2")
            .timeout(Duration::from_secs(30))
            .assert()
    })
    .await
    .unwrap();

    assert
        .code(30)
        .stderr(predicates::str::contains("E305"));

    // One initial attempt plus two retries
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let mut messages = Vec::new();
    while let Some(msg) = receiver.recv_timeout(Duration::from_millis(500)).await {
        messages.push(msg);
    }
    assert!(messages.iter().all(|m| m.addr == STATUS));
    assert_eq!(messages.last().map(|m| m.args.clone()), Some(vec![OscType::Bool(false)]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_token_without_input_fails() {
    let (url, attempts) = refusing_endpoint().await;
    let config = IsolatedConfig::new();
    let config_path = config.config_path();

    let assert = tokio::task::spawn_blocking(move || {
        assert_cmd::Command::cargo_bin("pulsoid-osc-bridge")
            .unwrap()
            .args(["run", "--config", &config_path])
            .env_remove("PULSOID_BRIDGE_TOKEN")
            .env("PULSOID_BRIDGE_STREAM_URL", url)
            .write_stdin("")
            .timeout(Duration::from_secs(30))
            .assert()
    })
    .await
    .unwrap();

    assert.code(40).stderr(predicates::str::contains("Authentication failed"));
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
    assert!(!config.token_path().exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stored_token_is_used() {
    let server = MockPulsoid::start(vec![90]).await;
    let receiver = OscReceiver::bind().await;
    let config = IsolatedConfig::new();
    std::fs::write(config.token_path(), "stored-token\n").unwrap();

    let child = Command::new(assert_cmd::cargo::cargo_bin("pulsoid-osc-bridge"))
        .args(["--quiet", "run", "--config", &config.config_path()])
        .env_remove("PULSOID_BRIDGE_TOKEN")
        .env("PULSOID_BRIDGE_STREAM_URL", server.ws_url())
        .env("PULSOID_BRIDGE_OSC_PORT", receiver.port().to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let _bridge = BridgeProcess(child);

    loop {
        let msg = receiver.recv().await;
        if msg.addr == "/avatar/parameters/HeartRateInt" {
            assert_eq!(msg.args, vec![OscType::Int(90)]);
            break;
        }
    }
    assert_eq!(server.auth_headers(), vec!["Bearer stored-token".to_string()]);
}
