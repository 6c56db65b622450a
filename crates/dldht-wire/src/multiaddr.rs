//! Textual multiaddr parsing and dial-target normalization.
//!
//! Addresses are layered `/<proto>/<value>` segments such as
//! `/ip4/127.0.0.1/tcp/46345/p2p/12D3KooW...`. The client only dials the TCP
//! family over IPv4/IPv6 (or DNS names), and every dial target carries the
//! remote peer identity as its final `/p2p/<id>` component.

use dldht_types::{DhtError, DhtResult};
use std::collections::HashSet;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// One component of a multiaddr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    /// `/ip4/<addr>`
    Ip4(Ipv4Addr),
    /// `/ip6/<addr>`
    Ip6(Ipv6Addr),
    /// `/dns/<name>`
    Dns(String),
    /// `/dns4/<name>`
    Dns4(String),
    /// `/dns6/<name>`
    Dns6(String),
    /// `/tcp/<port>`
    Tcp(u16),
    /// `/udp/<port>`
    Udp(u16),
    /// `/p2p/<peer-id>` (also accepted as `/ipfs/<peer-id>`)
    P2p(String),
    /// A value-less component such as `quic-v1`, `ws` or `p2p-circuit`.
    Flag(&'static str),
    /// A component the client never dials through but must carry, such as
    /// `/certhash/<hash>` or `/sni/<host>`. The value is kept verbatim.
    Opaque {
        name: &'static str,
        value: String,
    },
}

/// Components that appear in multiaddrs without a value.
const FLAG_PROTOCOLS: &[&str] = &[
    "quic",
    "quic-v1",
    "ws",
    "wss",
    "tls",
    "noise",
    "http",
    "https",
    "p2p-circuit",
    "webtransport",
    "webrtc",
    "webrtc-direct",
    "utp",
    "udt",
    "plaintextv2",
];

/// Components that take a value the client does not interpret.
const OPAQUE_PROTOCOLS: &[&str] = &[
    "certhash",
    "sni",
    "dnsaddr",
    "ip6zone",
    "ipcidr",
    "onion",
    "onion3",
    "garlic32",
    "garlic64",
    "sctp",
    "dccp",
    "memory",
    "http-path",
];

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ip4(a) => write!(f, "/ip4/{a}"),
            Protocol::Ip6(a) => write!(f, "/ip6/{a}"),
            Protocol::Dns(n) => write!(f, "/dns/{n}"),
            Protocol::Dns4(n) => write!(f, "/dns4/{n}"),
            Protocol::Dns6(n) => write!(f, "/dns6/{n}"),
            Protocol::Tcp(p) => write!(f, "/tcp/{p}"),
            Protocol::Udp(p) => write!(f, "/udp/{p}"),
            Protocol::P2p(id) => write!(f, "/p2p/{id}"),
            Protocol::Flag(name) => write!(f, "/{name}"),
            Protocol::Opaque { name, value } => write!(f, "/{name}/{value}"),
        }
    }
}

/// A parsed multiaddr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multiaddr {
    components: Vec<Protocol>,
}

impl Multiaddr {
    /// The ordered components.
    pub fn iter(&self) -> impl Iterator<Item = &Protocol> {
        self.components.iter()
    }

    /// The peer identity carried by a `/p2p/` component, if any.
    pub fn peer_id(&self) -> Option<&str> {
        self.components.iter().find_map(|p| match p {
            Protocol::P2p(id) => Some(id.as_str()),
            _ => None,
        })
    }

    /// Append `/p2p/<peer_id>`.
    pub fn with_peer(mut self, peer_id: &str) -> Self {
        self.components.push(Protocol::P2p(peer_id.to_string()));
        self
    }

    /// Everything before the first `/p2p/` component.
    pub fn without_peer(&self) -> Self {
        let components = self
            .components
            .iter()
            .take_while(|p| !matches!(p, Protocol::P2p(_)))
            .cloned()
            .collect();
        Self { components }
    }

    /// Whether the first component is an IP address and a `tcp` component follows.
    pub fn is_tcp_ip(&self) -> bool {
        matches!(
            self.components.first(),
            Some(Protocol::Ip4(_)) | Some(Protocol::Ip6(_))
        ) && self.components.iter().any(|p| matches!(p, Protocol::Tcp(_)))
    }

    /// Host and port of the TCP endpoint this address names.
    ///
    /// Fails for addresses that are not `<ip4|ip6|dns*>/<host>/tcp/<port>`.
    pub fn tcp_endpoint(&self) -> DhtResult<(String, u16)> {
        let host = match self.components.first() {
            Some(Protocol::Ip4(a)) => a.to_string(),
            Some(Protocol::Ip6(a)) => a.to_string(),
            Some(Protocol::Dns(n) | Protocol::Dns4(n) | Protocol::Dns6(n)) => n.clone(),
            _ => {
                return Err(DhtError::InvalidAddr(format!(
                    "{self} does not start with an ip4/ip6/dns component"
                )))
            }
        };
        match self.components.get(1) {
            Some(Protocol::Tcp(port)) => Ok((host, *port)),
            _ => Err(DhtError::InvalidAddr(format!(
                "{self} is not a tcp address"
            ))),
        }
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in &self.components {
            write!(f, "{p}")?;
        }
        Ok(())
    }
}

impl FromStr for Multiaddr {
    type Err = DhtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |why: &str| DhtError::InvalidAddr(format!("{s:?}: {why}"));

        let Some(body) = s.strip_prefix('/') else {
            return Err(invalid("multiaddr must start with \"/\""));
        };
        let mut parts = body.split('/');
        let mut components = Vec::new();

        while let Some(name) = parts.next() {
            if name.is_empty() {
                // Tolerate a single trailing slash.
                if parts.next().is_none() && !components.is_empty() {
                    break;
                }
                return Err(invalid("empty component"));
            }
            if let Some(flag) = FLAG_PROTOCOLS.iter().find(|f| **f == name) {
                components.push(Protocol::Flag(*flag));
                continue;
            }
            let value = parts
                .next()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| invalid(&format!("missing value for /{name}")))?;
            let component = match name {
                "ip4" => Protocol::Ip4(value.parse().map_err(|_| invalid("bad ip4"))?),
                "ip6" => Protocol::Ip6(value.parse().map_err(|_| invalid("bad ip6"))?),
                "dns" => Protocol::Dns(value.to_string()),
                "dns4" => Protocol::Dns4(value.to_string()),
                "dns6" => Protocol::Dns6(value.to_string()),
                "tcp" => Protocol::Tcp(value.parse().map_err(|_| invalid("bad tcp port"))?),
                "udp" => Protocol::Udp(value.parse().map_err(|_| invalid("bad udp port"))?),
                "p2p" | "ipfs" => Protocol::P2p(value.to_string()),
                other => match OPAQUE_PROTOCOLS.iter().find(|o| **o == other) {
                    Some(name) => Protocol::Opaque {
                        name: *name,
                        value: value.to_string(),
                    },
                    None => return Err(invalid(&format!("unsupported protocol /{other}"))),
                },
            };
            components.push(component);
        }

        if components.is_empty() {
            return Err(invalid("empty multiaddr"));
        }
        Ok(Self { components })
    }
}

/// A multiaddr guaranteed to end in the remote peer's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    addr: Multiaddr,
}

impl DialTarget {
    /// Build the dial target for `addr`.
    ///
    /// An address that already names a peer is kept verbatim; otherwise
    /// `/p2p/<peer_id>` is appended.
    pub fn new(addr: Multiaddr, peer_id: &str) -> Self {
        if addr.peer_id().is_some() {
            Self { addr }
        } else {
            Self {
                addr: addr.with_peer(peer_id),
            }
        }
    }

    /// The full multiaddr, peer suffix included.
    pub fn addr(&self) -> &Multiaddr {
        &self.addr
    }

    /// The peer identity this target dials.
    pub fn peer_id(&self) -> &str {
        self.addr.peer_id().unwrap_or_default()
    }

    /// Host and port to open a TCP connection to.
    pub fn tcp_endpoint(&self) -> DhtResult<(String, u16)> {
        self.addr.tcp_endpoint()
    }
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}

/// Build the ordered dial targets for a configured address list.
///
/// Blank entries are skipped and duplicates (by normalized string) dropped,
/// keeping the first occurrence.
pub fn build_targets(addrs: &[String], peer_id: &str) -> DhtResult<Vec<DialTarget>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for raw in addrs.iter().filter(|a| !a.trim().is_empty()) {
        let target = DialTarget::new(raw.parse()?, peer_id);
        if seen.insert(target.to_string()) {
            targets.push(target);
        }
    }
    if targets.is_empty() {
        return Err(DhtError::Config("no remote addresses provided".to_string()));
    }
    Ok(targets)
}

/// Reduce discovered addresses to dialable TCP addresses without a peer suffix.
///
/// Entries that are not ip4/ip6 + tcp (websocket, quic, relay-only, garbage)
/// are dropped. The `/p2p/` suffix is stripped because the client re-appends
/// the identity itself. Order is preserved and duplicates removed.
pub fn filter_tcp_addrs<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|s| s.as_ref().parse::<Multiaddr>().ok())
        .filter(Multiaddr::is_tcp_ip)
        .map(|ma| ma.without_peer().to_string())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: &str = "12D3KooWTestPeerIdDontCare";

    #[test]
    fn test_parse_display_roundtrip() {
        for s in [
            "/ip4/127.0.0.1/tcp/46345",
            "/ip6/::1/tcp/4001/p2p/QmPeer",
            "/dns4/node.example.org/tcp/443/wss",
            "/ip4/1.2.3.4/udp/4001/quic-v1",
        ] {
            let ma: Multiaddr = s.parse().unwrap();
            assert_eq!(ma.to_string(), s);
        }
    }

    #[test]
    fn test_opaque_components_roundtrip() {
        for s in [
            "/ip4/127.0.0.1/udp/46345/quic-v1/webtransport/certhash/uEiAkH5a4DPGKUuOBjYw0CgwjvcJCJMD2K_1aluKR_tpevQ/certhash/uEiAfbyd8cP7nN4b7ZeVU1ICB8rQm_2zDhXDmXzP2q_a_XQ",
            "/ip4/127.0.0.1/tcp/443/tls/sni/example.com/ws",
            "/dnsaddr/bootstrap.libp2p.io",
            "/dnsaddr/bootstrap.libp2p.io/p2p/QmPeer",
        ] {
            let ma: Multiaddr = s.parse().unwrap();
            assert_eq!(ma.to_string(), s);
        }
        let sni: Multiaddr = "/ip4/127.0.0.1/tcp/443/tls/sni/example.com/ws".parse().unwrap();
        assert!(sni.iter().any(|p| matches!(
            p,
            Protocol::Opaque { name: "sni", value } if value == "example.com"
        )));
        assert!(sni.is_tcp_ip());
    }

    #[test]
    fn test_opaque_components_are_not_dialable() {
        let dnsaddr: Multiaddr = "/dnsaddr/bootstrap.libp2p.io".parse().unwrap();
        assert!(!dnsaddr.is_tcp_ip());
        assert!(dnsaddr.tcp_endpoint().is_err());
        assert!("/certhash".parse::<Multiaddr>().is_err());
    }

    #[test]
    fn test_ipfs_alias_normalizes_to_p2p() {
        let ma: Multiaddr = "/ip4/1.2.3.4/tcp/1/ipfs/QmPeer".parse().unwrap();
        assert_eq!(ma.peer_id(), Some("QmPeer"));
        assert_eq!(ma.to_string(), "/ip4/1.2.3.4/tcp/1/p2p/QmPeer");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("ip4/1.2.3.4/tcp/1".parse::<Multiaddr>().is_err());
        assert!("/ip4/999.2.3.4/tcp/1".parse::<Multiaddr>().is_err());
        assert!("/ip4/1.2.3.4/tcp/notaport".parse::<Multiaddr>().is_err());
        assert!("/ip4/1.2.3.4/tcp".parse::<Multiaddr>().is_err());
        assert!("/carrier-pigeon/1".parse::<Multiaddr>().is_err());
        assert!("/".parse::<Multiaddr>().is_err());
    }

    #[test]
    fn test_dial_target_appends_peer() {
        let target = DialTarget::new("/ip4/1.2.3.4/tcp/1111".parse().unwrap(), PEER);
        let s = target.to_string();
        assert!(s.ends_with(&format!("/p2p/{PEER}")));
        assert_eq!(target.peer_id(), PEER);
    }

    #[test]
    fn test_dial_target_keeps_existing_peer() {
        let raw = format!("/ip4/1.2.3.4/tcp/1111/p2p/{PEER}");
        let target = DialTarget::new(raw.parse().unwrap(), PEER);
        assert_eq!(target.to_string(), raw);
    }

    #[test]
    fn test_build_targets_dedupes_and_orders() {
        let addrs = vec![
            "/ip4/10.0.0.1/tcp/1".to_string(),
            format!("/ip4/10.0.0.1/tcp/1/p2p/{PEER}"),
            "  ".to_string(),
            "/ip4/10.0.0.2/tcp/1".to_string(),
        ];
        let targets = build_targets(&addrs, PEER).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets[0].to_string().starts_with("/ip4/10.0.0.1/"));
        assert!(targets[1].to_string().starts_with("/ip4/10.0.0.2/"));
    }

    #[test]
    fn test_build_targets_empty_is_error() {
        assert!(build_targets(&[], PEER).is_err());
        assert!(build_targets(&["/bogus".to_string()], PEER).is_err());
    }

    #[test]
    fn test_tcp_endpoint() {
        let ma: Multiaddr = "/ip6/::1/tcp/4001/p2p/QmPeer".parse().unwrap();
        assert_eq!(ma.tcp_endpoint().unwrap(), ("::1".to_string(), 4001));
        let quic: Multiaddr = "/ip4/1.2.3.4/udp/4001/quic-v1".parse().unwrap();
        assert!(quic.tcp_endpoint().is_err());
    }

    #[test]
    fn test_filter_tcp_addrs() {
        let raw = [
            "/ip4/127.0.0.1/tcp/46345/p2p/QmSelf",
            "/ip4/127.0.0.1/tcp/46345",
            "/ip4/127.0.0.1/udp/46345/quic-v1",
            "/ip6/::1/tcp/46345",
            "/dns4/example.org/tcp/46345",
            "/ip4/10.1.1.1/tcp/46346/ws",
            "/ip4/127.0.0.1/udp/46345/quic-v1/webtransport/certhash/uEiAkH5a4DPGKUuOBjYw0CgwjvcJCJMD2K_1aluKR_tpevQ",
            "/dnsaddr/bootstrap.libp2p.io",
            "not-a-multiaddr",
        ];
        assert_eq!(
            filter_tcp_addrs(&raw),
            vec![
                "/ip4/127.0.0.1/tcp/46345".to_string(),
                "/ip6/::1/tcp/46345".to_string(),
                "/ip4/10.1.1.1/tcp/46346/ws".to_string(),
            ]
        );
    }
}
