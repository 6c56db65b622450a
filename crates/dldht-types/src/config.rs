//! Client configuration, loaded from `~/.dldht/config.toml` with defaults.

use crate::error::{DhtError, DhtResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Application protocol spoken when none is configured.
pub const DEFAULT_PROTOCOL_ID: &str = "/dl/api/1.0.0";

/// Default time allowed to establish a connection.
pub const DEFAULT_DIAL_TIMEOUT_MS: u64 = 10_000;

/// Default time allowed to open (negotiate) an application stream.
pub const DEFAULT_STREAM_TIMEOUT_MS: u64 = 20_000;

/// Default deadline for reading one response frame.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 4_000;

/// Largest value `put` will send (16 MB).
pub const DEFAULT_MAX_VALUE_SIZE: usize = 16 * 1024 * 1024;

/// Environment variable naming an explicit node status URL for discovery.
pub const STATUS_URL_ENV: &str = "DLDHT_STATUS_URL";

/// How to reach a remote dl-dht node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote peer identity.
    pub peer_id: String,
    /// Candidate multiaddrs of the remote node, tried in order.
    pub addrs: Vec<String>,
    /// Preferred application protocol id.
    pub protocol_id: String,
    /// Connect timeout in milliseconds.
    pub dial_timeout_ms: u64,
    /// Stream-open timeout in milliseconds.
    pub stream_timeout_ms: u64,
    /// Response read deadline in milliseconds.
    pub read_timeout_ms: u64,
    /// Maximum value size accepted by `put`.
    pub max_value_size: usize,
    /// Explicit status URL used by auto-discovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_url: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            peer_id: String::new(),
            addrs: Vec::new(),
            protocol_id: DEFAULT_PROTOCOL_ID.to_string(),
            dial_timeout_ms: DEFAULT_DIAL_TIMEOUT_MS,
            stream_timeout_ms: DEFAULT_STREAM_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            status_url: None,
        }
    }
}

impl ClientConfig {
    /// Config for a known peer with default timeouts.
    pub fn new(peer_id: impl Into<String>, addrs: Vec<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            addrs,
            ..Default::default()
        }
    }

    /// Check the fields that must be present before a client can be built.
    ///
    /// Address syntax is checked by the wire layer when it parses targets.
    pub fn validate(&self) -> DhtResult<()> {
        if self.peer_id.trim().is_empty() {
            return Err(DhtError::Config("peer_id is required".to_string()));
        }
        if self.addrs.iter().all(|a| a.trim().is_empty()) {
            return Err(DhtError::Config(
                "addrs must include at least one multiaddr".to_string(),
            ));
        }
        if self.protocol_id.trim().is_empty() {
            return Err(DhtError::Config("protocol_id must not be empty".to_string()));
        }
        Ok(())
    }

    /// Whether enough is configured to skip auto-discovery.
    pub fn has_endpoint(&self) -> bool {
        !self.peer_id.trim().is_empty() && self.addrs.iter().any(|a| !a.trim().is_empty())
    }

    /// Connect timeout.
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// Stream-open timeout.
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }

    /// Response read deadline.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Load the client configuration from a TOML file.
///
/// A missing file yields the defaults; a file that exists but cannot be read
/// or parsed is an error.
pub fn load_config(path: Option<&Path>) -> DhtResult<ClientConfig> {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return Ok(ClientConfig::default());
    }

    let contents = std::fs::read_to_string(&config_path).map_err(|e| {
        DhtError::Config(format!("failed to read {}: {e}", config_path.display()))
    })?;
    let config: ClientConfig = toml::from_str(&contents).map_err(|e| {
        DhtError::Config(format!("failed to parse {}: {e}", config_path.display()))
    })?;
    info!(path = %config_path.display(), "Loaded configuration");
    Ok(config)
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    dldht_home().join("config.toml")
}

/// Get the default dl-dht home directory.
pub fn dldht_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".dldht")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.protocol_id, "/dl/api/1.0.0");
        assert_eq!(config.dial_timeout(), Duration::from_secs(10));
        assert_eq!(config.stream_timeout(), Duration::from_secs(20));
        assert_eq!(config.read_timeout(), Duration::from_millis(4000));
        assert!(!config.has_endpoint());
    }

    #[test]
    fn test_validate_requires_peer_and_addrs() {
        let empty = ClientConfig::default();
        assert!(matches!(empty.validate(), Err(DhtError::Config(_))));

        let no_addrs = ClientConfig::new("12D3KooWPeer", vec![]);
        let err = no_addrs.validate().unwrap_err();
        assert!(err.to_string().contains("at least one multiaddr"));

        let blank_peer = ClientConfig::new("   ", vec!["/ip4/127.0.0.1/tcp/1".into()]);
        assert!(blank_peer.validate().is_err());

        let ok = ClientConfig::new("12D3KooWPeer", vec!["/ip4/127.0.0.1/tcp/1".into()]);
        assert!(ok.validate().is_ok());
        assert!(ok.has_endpoint());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
peer_id = "12D3KooWExample"
addrs = ["/ip4/10.0.0.5/tcp/46345"]
dial_timeout_ms = 2500
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.peer_id, "12D3KooWExample");
        assert_eq!(config.addrs, vec!["/ip4/10.0.0.5/tcp/46345".to_string()]);
        assert_eq!(config.dial_timeout_ms, 2500);
        assert_eq!(config.stream_timeout_ms, DEFAULT_STREAM_TIMEOUT_MS);
        assert_eq!(config.protocol_id, DEFAULT_PROTOCOL_ID);
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "peer_id = [not toml").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(DhtError::Config(_))
        ));
    }
}
