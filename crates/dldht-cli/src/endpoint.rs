//! Endpoint resolution: flags, then the config file, then auto-discovery.

use crate::cli::Cli;

use dldht_types::config::{load_config, STATUS_URL_ENV};
use dldht_types::{ClientConfig, DhtError, DhtResult};
use dldht_wire::{DhtClient, Discovery};
use tracing::debug;

/// Merge command-line flags over the config file.
pub fn merged_config(cli: &Cli) -> DhtResult<ClientConfig> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(peer_id) = &cli.peer_id {
        config.peer_id = peer_id.clone();
    }
    if !cli.addrs.is_empty() {
        config.addrs = cli.addrs.clone();
    }
    if let Some(protocol) = &cli.protocol {
        config.protocol_id = protocol.clone();
    }
    if cli.status_url.is_some() {
        config.status_url = cli.status_url.clone();
    }
    Ok(config)
}

/// Discovery client honoring `--status-url`, the config file, then `DLDHT_STATUS_URL`.
pub fn discovery_for(config: &ClientConfig) -> DhtResult<Discovery> {
    let env = std::env::var(STATUS_URL_ENV).ok();
    let override_url = config.status_url.as_deref().or(env.as_deref());
    Discovery::with_override(override_url)
}

/// Build a client for the resolved endpoint.
///
/// A half-specified endpoint (peer id without addresses or the reverse) is
/// an error rather than a reason to discover.
pub async fn resolve_client(cli: &Cli) -> DhtResult<DhtClient> {
    let config = merged_config(cli)?;
    if config.has_endpoint() {
        debug!(peer = %config.peer_id, "using configured endpoint");
        return DhtClient::new(config);
    }

    let partial =
        !config.peer_id.trim().is_empty() || config.addrs.iter().any(|a| !a.trim().is_empty());
    if partial {
        return Err(DhtError::Config(
            "both a peer id and at least one address are required".to_string(),
        ));
    }

    let found = discovery_for(&config)?.discover().await?;
    debug!(peer = %found.peer_id, "using discovered endpoint");
    DhtClient::new(found.into_config(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    const PEER: &str = "12D3KooWAbCdEfGhJkLmNpQrStUvWxYz123456789abcdefghijk";

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_flags_override_config_file() {
        let file = write_config(&format!(
            "peer_id = \"{PEER}\"\naddrs = [\"/ip4/10.0.0.1/tcp/1\"]\ndial_timeout_ms = 500\n"
        ));
        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from([
            "dldht",
            "--config",
            path,
            "--addr",
            "/ip4/10.0.0.2/tcp/2",
            "--protocol",
            "/dl/api/1",
            "status",
        ])
        .unwrap();

        let config = merged_config(&cli).unwrap();
        assert_eq!(config.peer_id, PEER);
        assert_eq!(config.addrs, vec!["/ip4/10.0.0.2/tcp/2"]);
        assert_eq!(config.protocol_id, "/dl/api/1");
        assert_eq!(config.dial_timeout_ms, 500);
    }

    #[tokio::test]
    async fn test_configured_endpoint_skips_discovery() {
        let file = write_config(&format!(
            "peer_id = \"{PEER}\"\naddrs = [\"/ip4/10.0.0.1/tcp/1\"]\n"
        ));
        let cli = Cli::try_parse_from([
            "dldht",
            "--config",
            file.path().to_str().unwrap(),
            "status",
        ])
        .unwrap();

        let client = resolve_client(&cli).await.unwrap();
        assert_eq!(client.peer_id(), PEER);
        assert_eq!(
            client.targets()[0].to_string(),
            format!("/ip4/10.0.0.1/tcp/1/p2p/{PEER}")
        );
    }

    #[tokio::test]
    async fn test_half_specified_endpoint_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.toml");
        let cli = Cli::try_parse_from([
            "dldht",
            "--config",
            missing.to_str().unwrap(),
            "--peer-id",
            PEER,
            "status",
        ])
        .unwrap();

        let err = resolve_client(&cli).await.err().unwrap();
        assert!(matches!(err, DhtError::Config(_)));
    }

    #[test]
    fn test_malformed_config_file() {
        let file = write_config("addrs = 7\n");
        let cli = Cli::try_parse_from([
            "dldht",
            "--config",
            file.path().to_str().unwrap(),
            "status",
        ])
        .unwrap();
        assert!(matches!(merged_config(&cli), Err(DhtError::Config(_))));
    }
}
