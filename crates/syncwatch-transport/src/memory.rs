//! In-process peer network
//!
//! Every [`MemoryNetwork`] clone shares one directory of registered peers, so
//! a host and any number of guests can live in the same process. Channels are
//! unbounded in-memory pipes with the same lifecycle events as real
//! transports: `Connected` first, `Data` in order, `Disconnected` on both ends
//! when either side closes.
//!
//! The network can also simulate signaling trouble on a registered peer
//! ([`MemoryNetwork::interrupt_signaling`]) and fatal endpoint errors
//! ([`MemoryNetwork::fail_endpoint`]).

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::traits::{
    Connection, EndpointEvent, PeerAddr, PeerEndpoint, PeerNetwork, TransportEvent,
    TransportReceiver, TransportSender,
};

/// State of a registered endpoint that other peers can reach
struct EndpointShared {
    addr: PeerAddr,
    events: Mutex<Option<mpsc::UnboundedSender<EndpointEvent>>>,
    channels: Mutex<Vec<Arc<MemorySender>>>,
}

impl EndpointShared {
    fn emit(&self, event: EndpointEvent) -> bool {
        match self.events.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    fn track(&self, sender: Arc<MemorySender>) {
        let mut channels = self.channels.lock();
        channels.retain(|s| s.is_connected());
        channels.push(sender);
    }
}

/// Shared in-process peer directory
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    peers: Arc<Mutex<HashMap<PeerAddr, Arc<EndpointShared>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered peers
    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    /// Check whether an address is registered
    pub fn is_registered(&self, addr: &str) -> bool {
        self.peers.lock().contains_key(addr)
    }

    /// Simulate losing the signaling connection of a peer
    pub fn interrupt_signaling(&self, addr: &str) -> bool {
        self.emit_to(addr, EndpointEvent::SignalingLost)
    }

    /// Simulate the signaling connection of a peer coming back
    pub fn restore_signaling(&self, addr: &str) -> bool {
        self.emit_to(addr, EndpointEvent::SignalingRestored)
    }

    /// Simulate a fatal endpoint error on a peer
    pub fn fail_endpoint(&self, addr: &str, reason: &str) -> bool {
        self.emit_to(addr, EndpointEvent::Error(reason.to_string()))
    }

    fn emit_to(&self, addr: &str, event: EndpointEvent) -> bool {
        let shared = self.peers.lock().get(addr).cloned();
        shared.map(|s| s.emit(event)).unwrap_or(false)
    }

    fn lookup(&self, addr: &str) -> Option<Arc<EndpointShared>> {
        self.peers.lock().get(addr).cloned()
    }

    fn unregister(&self, shared: &Arc<EndpointShared>) {
        let mut peers = self.peers.lock();
        if peers
            .get(&shared.addr)
            .map(|s| Arc::ptr_eq(s, shared))
            .unwrap_or(false)
        {
            peers.remove(&shared.addr);
        }
    }
}

#[async_trait]
impl PeerNetwork for MemoryNetwork {
    async fn open(&self, identity: Option<&str>) -> Result<Arc<dyn PeerEndpoint>> {
        let addr = identity
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(EndpointShared {
            addr: addr.clone(),
            events: Mutex::new(Some(tx)),
            channels: Mutex::new(Vec::new()),
        });

        {
            let mut peers = self.peers.lock();
            if peers.contains_key(&addr) {
                return Err(TransportError::AddressInUse(addr));
            }
            peers.insert(addr.clone(), shared.clone());
        }

        info!("Memory peer registered: {}", addr);

        Ok(Arc::new(MemoryEndpoint {
            shared,
            network: self.clone(),
            events: AsyncMutex::new(rx),
            destroyed: AtomicBool::new(false),
        }))
    }
}

/// A peer registered on a [`MemoryNetwork`]
pub struct MemoryEndpoint {
    shared: Arc<EndpointShared>,
    network: MemoryNetwork,
    events: AsyncMutex<mpsc::UnboundedReceiver<EndpointEvent>>,
    destroyed: AtomicBool,
}

impl MemoryEndpoint {
    fn shutdown(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.network.unregister(&self.shared);
        self.shared.events.lock().take();

        let channels = std::mem::take(&mut *self.shared.channels.lock());
        for channel in channels {
            channel.shut();
        }

        info!("Memory peer destroyed: {}", self.shared.addr);
    }
}

#[async_trait]
impl PeerEndpoint for MemoryEndpoint {
    fn local_addr(&self) -> PeerAddr {
        self.shared.addr.clone()
    }

    async fn connect(&self, remote: &str) -> Result<Connection> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(TransportError::Destroyed);
        }
        if remote == self.shared.addr {
            return Err(TransportError::ConnectionFailed(
                "cannot connect to self".to_string(),
            ));
        }

        let target = self
            .network
            .lookup(remote)
            .ok_or_else(|| TransportError::PeerUnavailable(remote.to_string()))?;

        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let local_sender = Arc::new(MemorySender {
            outbound: remote_tx.clone(),
            inbound: local_tx.clone(),
            open: open.clone(),
        });
        let remote_sender = Arc::new(MemorySender {
            outbound: local_tx.clone(),
            inbound: remote_tx.clone(),
            open,
        });

        let _ = local_tx.send(TransportEvent::Connected);
        let _ = remote_tx.send(TransportEvent::Connected);

        target.track(remote_sender.clone());
        self.shared.track(local_sender.clone());

        let incoming = Connection {
            peer: self.shared.addr.clone(),
            sender: remote_sender,
            receiver: Box::new(MemoryReceiver { rx: remote_rx }),
        };
        if !target.emit(EndpointEvent::Incoming(incoming)) {
            local_sender.shut();
            return Err(TransportError::PeerUnavailable(remote.to_string()));
        }

        debug!("Memory channel {} -> {} opened", self.shared.addr, remote);

        Ok(Connection {
            peer: remote.to_string(),
            sender: local_sender,
            receiver: Box::new(MemoryReceiver { rx: local_rx }),
        })
    }

    async fn next_event(&self) -> Option<EndpointEvent> {
        if self.destroyed.load(Ordering::SeqCst) {
            return None;
        }
        self.events.lock().await.recv().await
    }

    async fn destroy(&self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Sending half of an in-memory channel
pub struct MemorySender {
    outbound: mpsc::UnboundedSender<TransportEvent>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
    open: Arc<AtomicBool>,
}

impl MemorySender {
    fn shut(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.outbound.send(TransportEvent::Disconnected {
                reason: Some("closed by remote peer".to_string()),
            });
            let _ = self
                .inbound
                .send(TransportEvent::Disconnected { reason: None });
        }
    }
}

#[async_trait]
impl TransportSender for MemorySender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .send(TransportEvent::Data(data))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.shut();
        Ok(())
    }
}

/// Receiving half of an in-memory channel
pub struct MemoryReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for MemoryReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}
