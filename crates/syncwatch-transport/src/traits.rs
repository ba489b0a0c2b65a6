//! Transport trait definitions
//!
//! Two layers:
//! - a *channel* ([`TransportSender`] + [`TransportReceiver`]) is an ordered,
//!   reliable pipe to exactly one remote peer
//! - a *peer endpoint* ([`PeerEndpoint`]) is the local node's registered
//!   identity on a [`PeerNetwork`]; it dials other peers and surfaces inbound
//!   channels and signaling health

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Address of a peer on a network. Hosts hand theirs out as the party id.
pub type PeerAddr = String;

/// Events that can occur on a channel
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Channel is open and may carry data
    Connected,
    /// Channel closed (clean or error)
    Disconnected { reason: Option<String> },
    /// Data received
    Data(Bytes),
    /// Error occurred
    Error(String),
}

/// Trait for sending data
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send data
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Close the sender
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving data
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// A channel to one remote peer, not necessarily open yet.
///
/// The receiver yields [`TransportEvent::Connected`] once the channel is
/// usable.
pub struct Connection {
    /// Address of the remote peer
    pub peer: PeerAddr,
    pub sender: Arc<dyn TransportSender>,
    pub receiver: Box<dyn TransportReceiver>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("connected", &self.sender.is_connected())
            .finish()
    }
}

/// Peer-level events of a registered endpoint
#[derive(Debug)]
pub enum EndpointEvent {
    /// A remote peer opened a channel to us
    Incoming(Connection),
    /// Lost contact with the signaling side; the network is retrying
    SignalingLost,
    /// Signaling is back after a [`EndpointEvent::SignalingLost`]
    SignalingRestored,
    /// Fatal endpoint error; the identity is no longer usable
    Error(String),
}

/// The local node's identity on a peer network
#[async_trait]
pub trait PeerEndpoint: Send + Sync {
    /// Address other peers use to reach this endpoint
    fn local_addr(&self) -> PeerAddr;

    /// Open a channel to a remote peer
    async fn connect(&self, remote: &str) -> Result<Connection>;

    /// Next peer-level event; `None` once the endpoint is destroyed
    async fn next_event(&self) -> Option<EndpointEvent>;

    /// Close every channel this endpoint owns and release the identity
    async fn destroy(&self) -> Result<()>;
}

/// A network on which peers register identities and find each other
#[async_trait]
pub trait PeerNetwork: Send + Sync {
    /// Register a local identity. With `None` the network picks one.
    async fn open(&self, identity: Option<&str>) -> Result<Arc<dyn PeerEndpoint>>;
}
