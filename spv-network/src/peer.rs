//! Per-peer connection lifecycle: handshake, then message dispatch, then
//! teardown (§4.K, §6). Bitcoin Core doesn't have a formal state diagram for
//! this, but in practice a connection is always in one of three states:
//! `init` (TCP connected, handshake not complete), `connected` (handshake
//! complete, messages flowing), or `dead` (socket closed or protocol
//! violation). We model that directly rather than inferring it from scattered
//! booleans.

use std::{
    io,
    net::SocketAddr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::codec::Framed;
use tracing::{info, trace};

use spv_chain::block;

use crate::{
    constants,
    protocol::external::{types::*, Codec, Command, Message, Version},
};

/// Why a peer connection ended, or why it never got going.
#[derive(Debug)]
pub enum PeerError {
    Io(io::Error),
    /// The connect, handshake, or a request timed out.
    Timeout,
    /// The peer sent something other than `version`/`verack` before the
    /// handshake finished.
    HandshakeViolation(Command),
    /// The connection closed before the handshake finished.
    ConnectionClosed,
    /// The peer's `version.nonce` matched one we generated ourselves: this
    /// is a connection to ourselves, and must be dropped.
    SelfConnect,
}

impl From<io::Error> for PeerError {
    fn from(e: io::Error) -> PeerError {
        PeerError::Io(e)
    }
}

/// The state of a single peer connection.
pub enum PeerState {
    /// TCP connected (or accepted), handshake not yet complete.
    Init,
    /// Handshake complete: both `version` and `verack` have been exchanged
    /// in each direction.
    Connected(PeerInfo),
    /// The connection is closed or has been judged unusable.
    Dead,
}

/// What this node learned about a peer during its handshake.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub addr: SocketAddr,
    pub version: ProtocolVersion,
    pub services: PeerServices,
    pub user_agent: String,
    pub best_block: block::Height,
}

/// Accumulates the peer's declared clock against ours, so we can tell a
/// peer with an honest but skewed clock from one that's lying.
#[derive(Default)]
pub struct TimeOffsets {
    samples: Vec<i64>,
}

impl TimeOffsets {
    pub fn new() -> TimeOffsets {
        TimeOffsets::default()
    }

    /// Record the offset, in seconds, between a peer's declared time and
    /// ours.
    pub fn record(&mut self, peer_timestamp: chrono::DateTime<Utc>) {
        let now = Utc::now().timestamp();
        self.samples.push(peer_timestamp.timestamp() - now);
    }

    /// The median offset across all samples so far, if there are enough of
    /// them to trust (`MIN_PEER_TIME_SAMPLES`). Bitcoin Core only starts
    /// judging peers on clock skew once several have chimed in, so one
    /// dishonest peer can't swing the network-adjusted time on its own.
    pub fn median(&self) -> Option<i64> {
        if self.samples.len() < constants::MIN_PEER_TIME_SAMPLES {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        Some(sorted[sorted.len() / 2])
    }

    /// Whether the current median offset exceeds the tolerance this node
    /// allows before it stops trusting peer-declared time
    /// (`MAX_PEER_CLOCK_SKEW`). This never disconnects a peer by itself —
    /// it's reported so the caller can log it and fall back to its own
    /// clock.
    pub fn exceeds_tolerance(&self) -> bool {
        match self.median() {
            Some(offset) => offset.unsigned_abs() > constants::MAX_PEER_CLOCK_SKEW.as_secs(),
            None => false,
        }
    }
}

/// A connected peer: the framed socket plus everything learned about it.
pub struct Peer {
    pub info: PeerInfo,
    framed: Framed<TcpStream, Codec>,
}

impl Peer {
    /// Connect outbound to `addr` and perform the handshake, within
    /// `constants::CONNECT_TIMEOUT` for the connect itself.
    pub async fn connect(
        addr: SocketAddr,
        our_version: Version,
        codec: Codec,
    ) -> Result<Peer, PeerError> {
        let stream = timeout(constants::CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Peer::handshake(stream, our_version, codec).await
    }

    /// Wrap an already-connected socket (inbound or outbound) and run the
    /// handshake (§4.K): send `version`, then require `version` and
    /// `verack` from the peer before accepting anything else. Any other
    /// command during this window aborts the connection.
    pub async fn handshake(
        stream: TcpStream,
        our_version: Version,
        codec: Codec,
    ) -> Result<Peer, PeerError> {
        let mut framed = Framed::new(stream, codec);

        framed
            .send(Message::Version(our_version.clone()))
            .await?;

        let mut peer_info = None;
        let mut acks_remaining = 2u8; // their `version`, then our `verack` is implied once we've sent it

        // We send our verack as soon as we've seen their version; we need
        // their verack before the handshake is done.
        let mut sent_verack = false;

        loop {
            let message = timeout(constants::CONNECT_TIMEOUT, framed.next())
                .await
                .map_err(|_| PeerError::Timeout)?
                .ok_or(PeerError::ConnectionClosed)??;

            match message {
                Message::Version(theirs) => {
                    if peer_info.is_some() {
                        return Err(PeerError::HandshakeViolation(Command::Version));
                    }
                    if theirs.nonce == our_version.nonce {
                        return Err(PeerError::SelfConnect);
                    }
                    peer_info = Some(PeerInfo {
                        addr: framed.get_ref().peer_addr()?,
                        version: theirs.version,
                        services: theirs.services,
                        user_agent: theirs.user_agent,
                        best_block: theirs.best_block,
                    });
                    framed.send(Message::Verack).await?;
                    sent_verack = true;
                    acks_remaining -= 1;
                }
                Message::Verack => {
                    if peer_info.is_none() || !sent_verack {
                        return Err(PeerError::HandshakeViolation(Command::Verack));
                    }
                    acks_remaining -= 1;
                }
                other => return Err(PeerError::HandshakeViolation(other.command())),
            }

            if acks_remaining == 0 {
                break;
            }
        }

        let info = peer_info.expect("loop only exits once version has been seen");
        info!(addr = %info.addr, version = info.version.0, agent = %info.user_agent, "peer handshake complete");
        Ok(Peer { info, framed })
    }

    /// Receive the next message, or `None` if the peer closed the
    /// connection cleanly.
    pub async fn recv(&mut self) -> Result<Option<Message>, PeerError> {
        match self.framed.next().await {
            Some(result) => Ok(Some(result?)),
            None => Ok(None),
        }
    }

    pub async fn send(&mut self, message: Message) -> Result<(), PeerError> {
        self.framed.send(message).await?;
        Ok(())
    }

    /// Reply to a `ping` with a `pong` carrying the same nonce (§4.K).
    pub async fn handle_ping(&mut self, nonce: Nonce) -> Result<(), PeerError> {
        trace!(peer = %self.info.addr, "replying to ping");
        self.send(Message::Pong(nonce)).await
    }
}

/// A random nonce for use in an outbound `version` message, doubling as
/// this connection's self-connect detector.
pub fn random_nonce() -> Nonce {
    use rand::RngCore;
    Nonce(rand::thread_rng().next_u64())
}

/// The current wall-clock time as a Unix timestamp, used for
/// `version.timestamp` and last-success bookkeeping.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs_f64()
}
