//! Configuration file loading, end to end.

use std::fs;
use std::time::Duration;

use channel_bridge::testing::{ClientAction, ScriptedClient};
use channel_bridge::{Bridge, BridgeConfig, Frame, Message, SerializerKind};
use serde_json::json;

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("bridge.json");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_loaded_config_drives_bridge() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "url": "ws://loaded/socket",
            "query_params": [["vsn", "2.0.0"]],
            "auto_connect": true,
            "serializer": "compressed"
        }"#,
    );

    let config = BridgeConfig::load(&path).unwrap();
    assert_eq!(config.serializer, SerializerKind::Compressed);

    let (client, remote) = ScriptedClient::new();
    let bridge = Bridge::start(config, client).unwrap();
    bridge.status().unwrap();

    assert_eq!(
        remote.actions(),
        vec![ClientAction::Connect {
            url: "ws://loaded/socket".into(),
            query_params: vec![("vsn".into(), "2.0.0".into())],
        }]
    );
    let frame = remote
        .last_connect()
        .unwrap()
        .serializer
        .encode_message(&Message::new("room:1", "ping", json!({})))
        .unwrap();
    assert!(matches!(frame, Frame::Binary(_)));
}

#[test]
fn test_malformed_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "{\"url\": 42}");

    let err = BridgeConfig::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("bridge.json"));
}

#[test]
fn test_env_overrides_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, r#"{"default_timeout_ms": 100}"#);

    std::env::set_var("CHANNEL_BRIDGE_TIMEOUT_MS", "750");
    let config = BridgeConfig::load(&path);
    std::env::remove_var("CHANNEL_BRIDGE_TIMEOUT_MS");

    assert_eq!(config.unwrap().default_timeout(), Duration::from_millis(750));
}
