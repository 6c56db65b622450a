//! Auto-discovery of a locally running dl-dht node.
//!
//! The node exposes a small HTTP API next to its peer-to-peer listener.
//! Discovery walks a fixed list of base URLs and, for each base, asks
//! `GET {base}/v1/selfaddrs` (the node's real listen/advertised multiaddrs)
//! before falling back to `GET {base}/v1/status`. Identity and addresses
//! are validated before anything is trusted.
//!
//! Order of bases:
//! 1. `DLDHT_STATUS_URL` (a trailing `/v1/status` is stripped)
//! 2. `http://127.0.0.1:46346`
//! 3. `http://localhost:46346`

use crate::client::DhtClient;
use crate::multiaddr::filter_tcp_addrs;

use dldht_types::config::STATUS_URL_ENV;
use dldht_types::{ClientConfig, DhtError, DhtResult};
use regex_lite::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Loopback bases queried after any explicit override.
pub const DEFAULT_BASES: [&str; 2] = ["http://127.0.0.1:46346", "http://localhost:46346"];

/// Address assumed when a status response lists none.
pub const FALLBACK_ADDR: &str = "/ip4/127.0.0.1/tcp/46345";

/// Per-request timeout for discovery lookups.
const REQUEST_TIMEOUT_SECS: u64 = 2;

/// Why discovered identity or address material was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No peer id field was present.
    #[error("missing peer id")]
    MissingPeerId,
    /// The peer id matches no known encoding.
    #[error("invalid peer id {0:?}")]
    InvalidPeerId(String),
    /// The address list is empty.
    #[error("no addresses")]
    NoAddrs,
    /// An address does not look like a multiaddr.
    #[error("invalid address {0:?}")]
    InvalidAddr(String),
}

fn peer_id_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // CIDv1-style Ed25519 identity
            Regex::new(r"^12D3[Kk]oo[1-9A-HJ-NP-Za-km-z]{40,}$").expect("peer id regex is valid"),
            // CIDv0-style sha256 multihash
            Regex::new(r"^Qm[1-9A-HJ-NP-Za-km-z]{44}$").expect("peer id regex is valid"),
        ]
    })
}

/// Accept the two base58 peer-id encodings the node may report.
pub fn validate_peer_id(s: &str) -> Result<(), ValidationError> {
    if s.is_empty() {
        return Err(ValidationError::MissingPeerId);
    }
    if peer_id_patterns().iter().any(|re| re.is_match(s)) {
        Ok(())
    } else {
        Err(ValidationError::InvalidPeerId(s.to_string()))
    }
}

/// Require a non-empty list of `/`-prefixed address strings.
pub fn validate_addrs(addrs: &[String]) -> Result<(), ValidationError> {
    if addrs.is_empty() {
        return Err(ValidationError::NoAddrs);
    }
    match addrs.iter().find(|a| !a.starts_with('/')) {
        Some(bad) => Err(ValidationError::InvalidAddr(bad.clone())),
        None => Ok(()),
    }
}

/// Identity and addresses of a discovered node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEndpoint {
    /// Remote peer identity.
    pub peer_id: String,
    /// Dialable multiaddrs, without peer suffix.
    pub addrs: Vec<String>,
}

impl DiscoveredEndpoint {
    /// Check both fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_peer_id(&self.peer_id)?;
        validate_addrs(&self.addrs)
    }

    /// Fill `base` (timeouts, protocol) with the discovered endpoint.
    pub fn into_config(self, base: ClientConfig) -> ClientConfig {
        ClientConfig {
            peer_id: self.peer_id,
            addrs: self.addrs,
            ..base
        }
    }
}

fn peer_id_field(body: &Value) -> String {
    ["peerId", "PeerID"]
        .iter()
        .filter_map(|k| body.get(*k).and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn string_array(body: &Value, field: &str) -> Option<Vec<String>> {
    body.get(field).and_then(|v| v.as_array()).map(|arr| {
        arr.iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    })
}

/// Interpret a `/v1/selfaddrs` body.
///
/// Listening and advertised addresses are merged, reduced to IPv4/IPv6 TCP
/// entries without peer suffix, and de-duplicated.
pub fn parse_selfaddrs(body: &Value) -> Result<DiscoveredEndpoint, ValidationError> {
    let mut raw = string_array(body, "listeningAddrs").unwrap_or_default();
    raw.extend(string_array(body, "advertisedAddrs").unwrap_or_default());
    raw.retain(|s| !s.is_empty());

    let endpoint = DiscoveredEndpoint {
        peer_id: peer_id_field(body),
        addrs: filter_tcp_addrs(raw.as_slice()),
    };
    endpoint.validate()?;
    Ok(endpoint)
}

/// Interpret a `/v1/status` body.
///
/// Uses `addrs`, else `listenAddrs`, else the loopback fallback address.
pub fn parse_status(body: &Value) -> Result<DiscoveredEndpoint, ValidationError> {
    let mut addrs = string_array(body, "addrs")
        .or_else(|| string_array(body, "listenAddrs"))
        .unwrap_or_default();
    if addrs.is_empty() {
        addrs.push(FALLBACK_ADDR.to_string());
    }

    let endpoint = DiscoveredEndpoint {
        peer_id: peer_id_field(body),
        addrs,
    };
    endpoint.validate()?;
    Ok(endpoint)
}

/// Base URLs to query, in order, with an optional explicit override first.
pub fn candidate_bases(override_url: Option<&str>) -> Vec<String> {
    let explicit = override_url
        .map(|u| u.trim().trim_end_matches('/'))
        .map(|u| u.strip_suffix("/v1/status").unwrap_or(u))
        .map(|u| u.trim_end_matches('/').to_string())
        .filter(|u| !u.is_empty());

    let mut bases: Vec<String> = Vec::new();
    for base in explicit
        .into_iter()
        .chain(DEFAULT_BASES.iter().map(|b| b.to_string()))
    {
        if !bases.contains(&base) {
            bases.push(base);
        }
    }
    bases
}

/// HTTP lookup of local node endpoints.
#[derive(Debug, Clone)]
pub struct Discovery {
    http: reqwest::Client,
    bases: Vec<String>,
}

impl Discovery {
    /// Query exactly `bases`, in order.
    pub fn new(bases: Vec<String>) -> DhtResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .no_proxy()
            .build()
            .map_err(|e| DhtError::Discovery(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, bases })
    }

    /// Query the override URL (if any) and the default loopback bases.
    pub fn with_override(override_url: Option<&str>) -> DhtResult<Self> {
        Self::new(candidate_bases(override_url))
    }

    /// Like [`Discovery::with_override`], reading the override from `DLDHT_STATUS_URL`.
    pub fn from_env() -> DhtResult<Self> {
        let url = std::env::var(STATUS_URL_ENV).ok();
        Self::with_override(url.as_deref())
    }

    /// Bases in query order.
    pub fn bases(&self) -> &[String] {
        &self.bases
    }

    /// Find the first base that yields a validated endpoint.
    pub async fn discover(&self) -> DhtResult<DiscoveredEndpoint> {
        for base in &self.bases {
            let url = format!("{base}/v1/selfaddrs");
            if let Some(found) = self.fetch(&url, parse_selfaddrs).await {
                info!(%url, peer = %found.peer_id, addrs = found.addrs.len(), "discovered dl-dht node");
                return Ok(found);
            }

            let url = format!("{base}/v1/status");
            if let Some(found) = self.fetch(&url, parse_status).await {
                info!(%url, peer = %found.peer_id, addrs = found.addrs.len(), "discovered dl-dht node");
                return Ok(found);
            }
        }

        Err(DhtError::Discovery(format!(
            "No dl-dht node found. Start the node or set {STATUS_URL_ENV}."
        )))
    }

    async fn fetch(
        &self,
        url: &str,
        parse: fn(&Value) -> Result<DiscoveredEndpoint, ValidationError>,
    ) -> Option<DiscoveredEndpoint> {
        let resp = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(%url, error = %e, "discovery request failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            debug!(%url, status = %resp.status(), "discovery request returned error status");
            return None;
        }
        let body: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                debug!(%url, error = %e, "discovery request returned invalid JSON");
                return None;
            }
        };
        match parse(&body) {
            Ok(found) => Some(found),
            Err(e) => {
                debug!(%url, error = %e, "discovery response rejected");
                None
            }
        }
    }
}

/// Discover a local node and build a client for it.
///
/// The override comes from `DLDHT_STATUS_URL`. The client is returned
/// unstarted; the first call starts it.
pub async fn auto_attach() -> DhtResult<DhtClient> {
    let found = Discovery::from_env()?.discover().await?;
    DhtClient::new(found.into_config(ClientConfig::default()))
}
