//! Bridge configuration.
//!
//! Configuration can be built in code, parsed from JSON, or loaded from a
//! file. A small set of environment variables override file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::serializer::SerializerKind;

/// Configuration a bridge is started with.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Socket endpoint URL handed to the protocol client.
    pub url: String,
    /// Query parameters appended to the connect request.
    pub query_params: Vec<(String, String)>,
    /// Request a connection immediately on start.
    pub auto_connect: bool,
    /// Timeout in milliseconds reported by `Bridge::default_timeout`.
    pub default_timeout_ms: u64,
    /// Wire codec the protocol client should use.
    pub serializer: SerializerKind,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:4000/socket/websocket".to_string(),
            query_params: Vec::new(),
            auto_connect: true,
            default_timeout_ms: 5000,
            serializer: SerializerKind::Plain,
        }
    }
}

impl BridgeConfig {
    /// Create a configuration for the given socket URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set whether to connect on start.
    #[must_use]
    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// Select the wire codec.
    #[must_use]
    pub fn with_serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }

    /// Set the default timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Default timeout as a `Duration`.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Parse configuration from a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid bridge configuration JSON")
    }

    /// Load configuration from a JSON file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    /// Apply `CHANNEL_BRIDGE_*` environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("CHANNEL_BRIDGE_URL") {
            self.url = url;
        }

        if let Ok(auto_connect) = std::env::var("CHANNEL_BRIDGE_AUTO_CONNECT") {
            if let Ok(flag) = auto_connect.parse::<bool>() {
                self.auto_connect = flag;
            }
        }

        if let Ok(timeout) = std::env::var("CHANNEL_BRIDGE_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                self.default_timeout_ms = ms;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert!(config.auto_connect);
        assert_eq!(config.default_timeout(), Duration::from_secs(5));
        assert_eq!(config.serializer, SerializerKind::Plain);
    }

    #[test]
    fn test_builder() {
        let config = BridgeConfig::new("ws://example.test/socket")
            .with_auto_connect(false)
            .with_query_param("token", "abc")
            .with_serializer(SerializerKind::Compressed)
            .with_default_timeout(Duration::from_millis(250));

        assert_eq!(config.url, "ws://example.test/socket");
        assert!(!config.auto_connect);
        assert_eq!(config.query_params, vec![("token".to_string(), "abc".to_string())]);
        assert_eq!(config.serializer, SerializerKind::Compressed);
        assert_eq!(config.default_timeout_ms, 250);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            BridgeConfig::from_json_str(r#"{"url": "ws://h/s", "serializer": "compressed"}"#)
                .unwrap();
        assert_eq!(config.url, "ws://h/s");
        assert_eq!(config.serializer, SerializerKind::Compressed);
        assert!(config.auto_connect);
    }

    #[test]
    fn test_invalid_json_is_error() {
        let err = BridgeConfig::from_json_str("{not json").unwrap_err();
        assert!(err.to_string().contains("Invalid bridge configuration"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BridgeConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
