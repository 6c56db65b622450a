//! dl-dht wire layer: reach a dl-dht node and talk to its key/value API.
//!
//! A request is a single JSON line written to a fresh stream; the node
//! answers with a single JSON line and closes. Binary values travel as
//! base64 strings.
//!
//! ## Architecture
//!
//! - **Multiaddr / DialTarget**: address parsing and per-peer dial targets
//! - **message**: request/response frames and the bounded frame reader
//! - **Transport**: trait for dialing and opening protocol streams, with a
//!   plain TCP + multistream-select implementation
//! - **p2p**: the default transport, a libp2p swarm (Noise + Yamux) that
//!   verifies the remote identity
//! - **DhtClient**: the RPC engine, falling back across addresses and
//!   protocol ids
//! - **Discovery**: HTTP auto-discovery of a local node

pub mod client;
pub mod discovery;
pub mod message;
pub mod multiaddr;
pub mod p2p;
pub mod transport;

pub use client::{protocol_candidates, DhtClient};
pub use discovery::{auto_attach, DiscoveredEndpoint, Discovery, ValidationError};
pub use message::{Op, Reply, RpcRequest, RpcResponse};
pub use multiaddr::{DialTarget, Multiaddr};
pub use p2p::Libp2pTransport;
pub use transport::{TcpTransport, Transport};
