//! RPC engine for a remote dl-dht node.
//!
//! Every call walks the configured dial targets in order and, for each
//! target, the candidate protocol ids in order. Each (target, protocol)
//! attempt connects, opens a stream, writes one request line, half-closes,
//! and reads one response frame. The first attempt that yields a frame wins;
//! failures are recorded and the walk moves on. Only when every pair has
//! failed does the caller see the last recorded error.

use crate::message::{
    decode_response, encode_request, preview, read_frame, Reply, RpcRequest, RpcResponse,
    MAX_FRAME_SIZE,
};
use crate::multiaddr::{build_targets, DialTarget};
use crate::p2p::Libp2pTransport;
use crate::transport::Transport;

use dldht_types::config::DEFAULT_PROTOCOL_ID;
use dldht_types::{validate_key, ClientConfig, DhtError, DhtResult};
use serde_json::Value;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Protocol ids tried after the configured one, newest first.
pub const LEGACY_PROTOCOLS: [&str; 3] = [DEFAULT_PROTOCOL_ID, "/dl/api/1.0", "/dl/api/1"];

/// Ordered, de-duplicated protocol candidates: `configured` first, then the
/// legacy ids.
pub fn protocol_candidates(configured: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(LEGACY_PROTOCOLS.len() + 1);
    for p in std::iter::once(configured).chain(LEGACY_PROTOCOLS) {
        if !out.iter().any(|seen| seen == p) {
            out.push(p.to_string());
        }
    }
    out
}

/// Client for one remote node.
pub struct DhtClient<T: Transport = Libp2pTransport> {
    config: ClientConfig,
    peer_id: String,
    targets: Vec<DialTarget>,
    protocols: Vec<String>,
    transport: T,
    started: Mutex<bool>,
}

impl DhtClient<Libp2pTransport> {
    /// Build a client over the libp2p transport. Nothing is dialed yet.
    pub fn new(config: ClientConfig) -> DhtResult<Self> {
        Self::with_transport(config, Libp2pTransport::new())
    }

    /// Build a client and start its transport.
    pub async fn connect(config: ClientConfig) -> DhtResult<Self> {
        let client = Self::new(config)?;
        client.start().await?;
        Ok(client)
    }
}

impl<T: Transport> DhtClient<T> {
    /// Build a client over a caller-supplied transport.
    pub fn with_transport(config: ClientConfig, transport: T) -> DhtResult<Self> {
        config.validate()?;
        let peer_id = config.peer_id.trim().to_string();
        let targets = build_targets(&config.addrs, &peer_id)?;
        let protocols = protocol_candidates(config.protocol_id.trim());
        Ok(Self {
            config,
            peer_id,
            targets,
            protocols,
            transport,
            started: Mutex::new(false),
        })
    }

    /// Remote peer identity.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Dial targets in the order they are tried.
    pub fn targets(&self) -> &[DialTarget] {
        &self.targets
    }

    /// Protocol ids in the order they are tried.
    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether the transport has been started.
    pub async fn is_started(&self) -> bool {
        *self.started.lock().await
    }

    /// Start the transport. Calling it again is a no-op.
    pub async fn start(&self) -> DhtResult<()> {
        let mut started = self.started.lock().await;
        if *started {
            return Ok(());
        }
        self.transport.start().await?;
        *started = true;
        info!(peer = %self.peer_id, targets = self.targets.len(), "dl-dht client started");
        Ok(())
    }

    /// Stop the transport. A no-op when not started.
    pub async fn stop(&self) -> DhtResult<()> {
        let mut started = self.started.lock().await;
        if !*started {
            return Ok(());
        }
        self.transport.stop().await?;
        *started = false;
        info!(peer = %self.peer_id, "dl-dht client stopped");
        Ok(())
    }

    /// Fetch a value. `Ok(None)` when the node reports the key missing.
    pub async fn get(&self, key: &str) -> DhtResult<Option<Vec<u8>>> {
        validate_key(key)?;
        match self.request(RpcRequest::get(key)).await? {
            Reply::Value(v) => Ok(v),
            other => Err(unexpected(other)),
        }
    }

    /// Store a value with an optional TTL (`0` = node default).
    pub async fn put(&self, key: &str, value: impl Into<Vec<u8>>, ttl_secs: u64) -> DhtResult<()> {
        validate_key(key)?;
        let value = value.into();
        if value.len() > self.config.max_value_size {
            return Err(DhtError::ValueTooLarge {
                size: value.len(),
                max: self.config.max_value_size,
            });
        }
        match self.request(RpcRequest::put(key, value, ttl_secs)).await? {
            Reply::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Delete a value.
    pub async fn del(&self, key: &str) -> DhtResult<()> {
        validate_key(key)?;
        match self.request(RpcRequest::del(key)).await? {
            Reply::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Node status document.
    pub async fn status(&self) -> DhtResult<Value> {
        match self.request(RpcRequest::status()).await? {
            Reply::Status(v) => Ok(v),
            other => Err(unexpected(other)),
        }
    }

    async fn request(&self, req: RpcRequest) -> DhtResult<Reply> {
        let op = req.op;
        let key = req.key.clone();
        let resp = self.call(&req).await?;
        resp.into_reply(op, key.as_deref())
    }

    /// Run one request through the target × protocol fallback walk.
    pub async fn call(&self, req: &RpcRequest) -> DhtResult<RpcResponse> {
        self.start().await?;
        let frame = encode_request(req)?;
        let mut last_err: Option<DhtError> = None;

        for target in &self.targets {
            for protocol in &self.protocols {
                match self.attempt(target, protocol, &frame).await {
                    Ok(resp) => {
                        debug!(op = req.op.as_str(), %target, %protocol, "rpc complete");
                        return Ok(resp);
                    }
                    Err(e) => {
                        debug!(op = req.op.as_str(), %target, %protocol, error = %e, "rpc attempt failed");
                        last_err = Some(e);
                    }
                }
            }
        }

        let err = last_err.unwrap_or(DhtError::NoAttempts);
        warn!(op = req.op.as_str(), peer = %self.peer_id, error = %err, "all targets and protocols failed");
        Err(err)
    }

    async fn attempt(
        &self,
        target: &DialTarget,
        protocol: &str,
        frame: &[u8],
    ) -> DhtResult<RpcResponse> {
        let conn = with_timeout(
            self.config.dial_timeout(),
            self.transport.dial(target),
            || format!("dial timeout to {target}"),
        )
        .await?;

        let mut stream = with_timeout(
            self.config.stream_timeout(),
            self.transport.open_stream(conn, protocol),
            || format!("open stream timeout to {target} ({protocol})"),
        )
        .await?;
        debug!(%protocol, "using protocol");

        // The stream is owned by this scope: dropped on every return path.
        let exchanged = self.exchange(&mut stream, target, frame).await;
        let _ = stream.shutdown().await;
        exchanged
    }

    async fn exchange(
        &self,
        stream: &mut T::Stream,
        target: &DialTarget,
        frame: &[u8],
    ) -> DhtResult<RpcResponse> {
        with_timeout(
            self.config.stream_timeout(),
            async {
                stream.write_all(frame).await?;
                stream.flush().await?;
                // Half-close so a peer that reads until EOF sees the end of the request.
                stream.shutdown().await
            },
            || format!("write timeout to {target}"),
        )
        .await?;

        let deadline = Instant::now() + self.config.read_timeout();
        let text = read_frame(stream, deadline, MAX_FRAME_SIZE).await?;
        let clean = text.trim_end_matches('\0').trim();
        if clean.is_empty() {
            debug!("raw reply: (empty)");
        } else {
            debug!("raw reply: (len={}) {}", clean.len(), preview(clean));
        }
        decode_response(clean)
    }
}

async fn with_timeout<F, R>(
    limit: Duration,
    fut: F,
    label: impl FnOnce() -> String,
) -> DhtResult<R>
where
    F: std::future::Future<Output = std::io::Result<R>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(DhtError::from),
        Err(_) => Err(DhtError::Timeout(label())),
    }
}

fn unexpected(reply: Reply) -> DhtError {
    DhtError::Protocol(format!("unexpected reply {reply:?}"))
}
