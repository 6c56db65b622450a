//! Authenticated peer-to-peer transport.
//!
//! [`Libp2pTransport`] runs a libp2p swarm (TCP + Noise + Yamux) under a
//! fresh Ed25519 identity created at `start`. Dials are checked against the
//! `/p2p/<id>` of the target: a node answering with any other identity fails
//! the Noise handshake and the dial is reported as an error. Application
//! streams are negotiated per protocol id on the multiplexed connection.
//!
//! The swarm is owned by a background task; the transport talks to it over
//! a command channel and opens streams through a shared stream control.

use crate::multiaddr::DialTarget;
use crate::transport::Transport;

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use libp2p::swarm::{ConnectionId, SwarmEvent};
use libp2p::{noise, tcp, yamux, PeerId, StreamProtocol, Swarm, SwarmBuilder};
use libp2p_stream::OpenStreamError;
use std::collections::HashMap;
use std::io;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};
use tracing::{debug, info, warn};

/// How long an unused connection stays open.
const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Pending commands the swarm task buffers before dials back-pressure.
const COMMAND_BUFFER: usize = 16;

type DialReply = oneshot::Sender<io::Result<PeerId>>;

enum Command {
    Dial {
        peer: PeerId,
        addr: libp2p::Multiaddr,
        reply: DialReply,
    },
}

struct Running {
    commands: mpsc::Sender<Command>,
    control: libp2p_stream::Control,
    local_peer: PeerId,
    task: JoinHandle<()>,
}

/// Transport over a libp2p swarm with an ephemeral identity.
#[derive(Default)]
pub struct Libp2pTransport {
    running: Mutex<Option<Running>>,
}

impl Libp2pTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity of the local swarm while started.
    pub async fn local_peer_id(&self) -> Option<PeerId> {
        self.running.lock().await.as_ref().map(|r| r.local_peer)
    }

    async fn commands(&self) -> io::Result<mpsc::Sender<Command>> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| r.commands.clone())
            .ok_or_else(not_started)
    }

    async fn control(&self) -> io::Result<libp2p_stream::Control> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| r.control.clone())
            .ok_or_else(not_started)
    }
}

#[async_trait]
impl Transport for Libp2pTransport {
    type Connection = PeerId;
    type Stream = Compat<libp2p::Stream>;

    async fn start(&self) -> io::Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }
        let swarm = build_swarm()?;
        let control = swarm.behaviour().new_control();
        let local_peer = *swarm.local_peer_id();
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(drive(swarm, rx));
        info!(%local_peer, "libp2p transport started");
        *running = Some(Running {
            commands,
            control,
            local_peer,
            task,
        });
        Ok(())
    }

    async fn dial(&self, target: &DialTarget) -> io::Result<PeerId> {
        let peer: PeerId = target.peer_id().parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid peer id {:?}: {e}", target.peer_id()),
            )
        })?;
        let addr: libp2p::Multiaddr = target
            .addr()
            .without_peer()
            .to_string()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{target}: {e}")))?;

        let (reply, answer) = oneshot::channel();
        self.commands()
            .await?
            .send(Command::Dial { peer, addr, reply })
            .await
            .map_err(|_| swarm_gone())?;
        let connected = answer.await.map_err(|_| swarm_gone())??;
        debug!(%target, "connected");
        Ok(connected)
    }

    async fn open_stream(&self, peer: PeerId, protocol: &str) -> io::Result<Self::Stream> {
        let id = StreamProtocol::try_from_owned(protocol.to_string()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid protocol id {protocol:?}"),
            )
        })?;
        match self.control().await?.open_stream(peer, id).await {
            Ok(stream) => Ok(stream.compat()),
            Err(OpenStreamError::UnsupportedProtocol(p)) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("remote does not support {p}"),
            )),
            Err(e) => Err(io::Error::other(e.to_string())),
        }
    }

    async fn stop(&self) -> io::Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        // Closing the command channel ends the swarm task.
        drop(running.commands);
        running.task.await.map_err(|e| io::Error::other(e.to_string()))?;
        info!(local_peer = %running.local_peer, "libp2p transport stopped");
        Ok(())
    }
}

fn build_swarm() -> io::Result<Swarm<libp2p_stream::Behaviour>> {
    let swarm = SwarmBuilder::with_new_identity()
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| io::Error::other(e.to_string()))?
        .with_behaviour(|_| libp2p_stream::Behaviour::new())
        .map_err(|e| io::Error::other(e.to_string()))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT))
        .build();
    Ok(swarm)
}

async fn drive(mut swarm: Swarm<libp2p_stream::Behaviour>, mut commands: mpsc::Receiver<Command>) {
    let mut pending: HashMap<ConnectionId, DialReply> = HashMap::new();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Dial { peer, addr, reply }) => {
                    if swarm.is_connected(&peer) {
                        let _ = reply.send(Ok(peer));
                    } else {
                        let opts = DialOpts::peer_id(peer)
                            .addresses(vec![addr])
                            .condition(PeerCondition::Always)
                            .build();
                        let id = opts.connection_id();
                        match swarm.dial(opts) {
                            Ok(()) => {
                                pending.insert(id, reply);
                            }
                            Err(e) => {
                                let _ = reply.send(Err(refused(e.to_string())));
                            }
                        }
                    }
                }
                None => break,
            },
            event = swarm.select_next_some() => match event {
                SwarmEvent::ConnectionEstablished { peer_id, connection_id, .. } => {
                    if let Some(reply) = pending.remove(&connection_id) {
                        let _ = reply.send(Ok(peer_id));
                    }
                }
                SwarmEvent::OutgoingConnectionError { connection_id, error, .. } => {
                    if let Some(reply) = pending.remove(&connection_id) {
                        warn!(error = %error, "dial failed");
                        let _ = reply.send(Err(refused(error.to_string())));
                    }
                }
                _ => {}
            },
        }
    }
    debug!("swarm task finished");
}

fn refused(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionRefused, msg)
}

fn not_started() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "libp2p transport not started")
}

fn swarm_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "libp2p swarm task exited")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_clears_identity() {
        let transport = Libp2pTransport::new();
        assert!(transport.local_peer_id().await.is_none());

        transport.start().await.unwrap();
        let first = transport.local_peer_id().await.unwrap();
        transport.start().await.unwrap();
        assert_eq!(transport.local_peer_id().await, Some(first));

        transport.stop().await.unwrap();
        assert!(transport.local_peer_id().await.is_none());
        transport.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_dial_before_start_fails() {
        let transport = Libp2pTransport::new();
        let key = libp2p::identity::Keypair::generate_ed25519();
        let target = DialTarget::new(
            "/ip4/127.0.0.1/tcp/1".parse().unwrap(),
            &key.public().to_peer_id().to_string(),
        );
        let err = transport.dial(&target).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_dial_rejects_malformed_peer_id() {
        let transport = Libp2pTransport::new();
        transport.start().await.unwrap();
        let target = DialTarget::new("/ip4/127.0.0.1/tcp/1".parse().unwrap(), "not-a-peer");
        let err = transport.dial(&target).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        transport.stop().await.unwrap();
    }
}
