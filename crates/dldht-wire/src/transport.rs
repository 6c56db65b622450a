//! Transport capability used by the RPC engine.
//!
//! The engine only needs three things from the network: dial a target, open
//! an application stream speaking a given protocol id over that connection,
//! and tear everything down. [`Transport`] captures exactly that, so the
//! engine can run over a real socket, a secure multiplexed stack supplied by
//! the embedding application, or an in-memory test double.
//!
//! [`TcpTransport`] is the plaintext implementation for nodes that expose the
//! API on a bare socket: one TCP connection per stream, with the protocol id
//! agreed via multistream-select 1.0.0. It does not check the remote
//! identity; the default client transport is [`crate::p2p::Libp2pTransport`].

use crate::multiaddr::DialTarget;

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Multistream-select protocol header.
pub const MULTISTREAM_PROTOCOL: &str = "/multistream/1.0.0";

/// Multistream-select rejection message.
const NA: &str = "na";

/// Largest negotiation message accepted from the remote.
pub const MAX_NEGOTIATION_LINE: usize = 1024;

/// Abstract transport able to reach a remote peer and open protocol streams.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// An established connection to a peer.
    type Connection: Send + 'static;

    /// A bidirectional application stream. `shutdown()` half-closes the
    /// write side.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// One-time setup (identity, listeners, background tasks).
    async fn start(&self) -> io::Result<()>;

    /// Establish a connection to the target.
    async fn dial(&self, target: &DialTarget) -> io::Result<Self::Connection>;

    /// Open a stream on `conn` that speaks `protocol`.
    async fn open_stream(&self, conn: Self::Connection, protocol: &str)
        -> io::Result<Self::Stream>;

    /// Release everything created by `start`.
    async fn stop(&self) -> io::Result<()>;
}

/// Plain TCP transport with multistream-select protocol negotiation.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    nodelay: bool,
}

impl TcpTransport {
    /// Create a transport with `TCP_NODELAY` enabled on every socket.
    pub fn new() -> Self {
        Self { nodelay: true }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Connection = TcpStream;
    type Stream = TcpStream;

    async fn start(&self) -> io::Result<()> {
        debug!("tcp transport ready");
        Ok(())
    }

    async fn dial(&self, target: &DialTarget) -> io::Result<TcpStream> {
        let (host, port) = target
            .tcp_endpoint()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let stream = TcpStream::connect((host.as_str(), port)).await?;
        if self.nodelay {
            stream.set_nodelay(true)?;
        }
        debug!(%target, "connected");
        Ok(stream)
    }

    async fn open_stream(&self, mut conn: TcpStream, protocol: &str) -> io::Result<TcpStream> {
        negotiate(&mut conn, protocol).await?;
        Ok(conn)
    }

    async fn stop(&self) -> io::Result<()> {
        debug!("tcp transport stopped");
        Ok(())
    }
}

/// Agree on `protocol` as the dialer side of multistream-select.
///
/// Both messages are sent up front; the listener must answer with the
/// multistream header followed by an echo of `protocol` (or `na`).
pub async fn negotiate<S>(stream: &mut S, protocol: &str) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut out = Vec::new();
    encode_line(&mut out, MULTISTREAM_PROTOCOL);
    encode_line(&mut out, protocol);
    stream.write_all(&out).await?;
    stream.flush().await?;

    let header = read_line(stream).await?;
    if header != MULTISTREAM_PROTOCOL {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected multistream header {header:?}"),
        ));
    }
    let answer = read_line(stream).await?;
    if answer == protocol {
        Ok(())
    } else if answer == NA {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("protocol {protocol} not supported by remote"),
        ))
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected negotiation answer {answer:?} for {protocol}"),
        ))
    }
}

/// Append a varint-length-prefixed, newline-terminated message.
pub fn encode_line(out: &mut Vec<u8>, msg: &str) {
    encode_varint(out, msg.len() as u64 + 1);
    out.extend_from_slice(msg.as_bytes());
    out.push(b'\n');
}

/// Read one varint-length-prefixed, newline-terminated message.
pub async fn read_line<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let len = read_varint(reader).await? as usize;
    if len == 0 || len > MAX_NEGOTIATION_LINE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid negotiation message length {len}"),
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    if buf.pop() != Some(b'\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "negotiation message not newline-terminated",
        ));
    }
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn encode_varint(out: &mut Vec<u8>, mut n: u64) {
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

async fn read_varint<R>(reader: &mut R) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut value = 0u64;
    for shift in (0..64).step_by(7).take(9) {
        let byte = reader.read_u8().await?;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "varint overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Listener side of multistream-select supporting `supported`.
    async fn respond<S>(stream: &mut S, supported: &[&str]) -> io::Result<Option<String>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let header = read_line(stream).await?;
        assert_eq!(header, MULTISTREAM_PROTOCOL);
        let mut out = Vec::new();
        encode_line(&mut out, MULTISTREAM_PROTOCOL);
        let proposed = read_line(stream).await?;
        let accepted = supported.contains(&proposed.as_str());
        encode_line(&mut out, if accepted { proposed.as_str() } else { NA });
        stream.write_all(&out).await?;
        Ok(accepted.then_some(proposed))
    }

    #[test]
    fn test_varint_encoding() {
        let mut out = Vec::new();
        encode_varint(&mut out, 1);
        assert_eq!(out, vec![0x01]);
        out.clear();
        encode_varint(&mut out, 300);
        assert_eq!(out, vec![0xac, 0x02]);
    }

    #[test]
    fn test_encode_line_layout() {
        let mut out = Vec::new();
        encode_line(&mut out, MULTISTREAM_PROTOCOL);
        assert_eq!(out[0] as usize, MULTISTREAM_PROTOCOL.len() + 1);
        assert_eq!(&out[1..out.len() - 1], MULTISTREAM_PROTOCOL.as_bytes());
        assert_eq!(*out.last().unwrap(), b'\n');
    }

    #[tokio::test]
    async fn test_read_line_rejects_oversized() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, (MAX_NEGOTIATION_LINE + 1) as u64);
        let mut reader: &[u8] = &buf;
        let err = read_line(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_negotiate_accepted() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let listener =
            tokio::spawn(async move { respond(&mut server, &["/dl/api/1.0.0"]).await.unwrap() });
        negotiate(&mut client, "/dl/api/1.0.0").await.unwrap();
        assert_eq!(listener.await.unwrap().as_deref(), Some("/dl/api/1.0.0"));
    }

    #[tokio::test]
    async fn test_negotiate_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let listener = tokio::spawn(async move { respond(&mut server, &["/dl/api/1"]).await });
        let err = negotiate(&mut client, "/dl/api/1.0.0").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert_eq!(listener.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_tcp_transport_dial_and_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            respond(&mut sock, &["/dl/api/1.0"]).await.unwrap()
        });

        let transport = TcpTransport::new();
        transport.start().await.unwrap();
        let target = DialTarget::new(
            format!("/ip4/127.0.0.1/tcp/{port}").parse().unwrap(),
            "QmPeer",
        );
        let conn = transport.dial(&target).await.unwrap();
        transport.open_stream(conn, "/dl/api/1.0").await.unwrap();
        assert_eq!(server.await.unwrap().as_deref(), Some("/dl/api/1.0"));
        transport.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_transport_rejects_non_tcp_target() {
        let transport = TcpTransport::new();
        let target = DialTarget::new(
            "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap(),
            "QmPeer",
        );
        let err = transport.dial(&target).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
