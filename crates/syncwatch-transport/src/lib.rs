//! SyncWatch Transport Layer
//!
//! Channel and peer-network abstractions the party engine is written
//! against, plus two implementations:
//! - Memory (in-process directory, for tests and embedding)
//! - WebSocket (host listens, guests dial its `ws://` address)

pub mod error;
pub mod traits;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{
    Connection, EndpointEvent, PeerAddr, PeerEndpoint, PeerNetwork, TransportEvent,
    TransportReceiver, TransportSender,
};

#[cfg(feature = "memory")]
pub use memory::MemoryNetwork;

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketNetwork};
