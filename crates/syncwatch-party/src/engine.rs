//! Party engine
//!
//! [`WatchParty`] owns everything one session needs: the role, the channel
//! registry, the attached clock and the echo guard. It is driven by a single
//! task (see [`crate::runtime`]) so none of that state is locked.
//!
//! Transport activity reaches the engine as [`Inbound`] items produced by
//! small pump tasks. Every item carries the session epoch it was produced
//! under; teardown bumps the epoch, so late events from a finished session
//! are ignored.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use syncwatch_core::{decode, Message, PlaybackSnapshot};
use syncwatch_transport::{
    Connection, EndpointEvent, PeerAddr, PeerEndpoint, PeerNetwork, TransportError,
    TransportEvent, TransportSender,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clock::PlaybackClock;
use crate::config::PartyConfig;
use crate::echo::EchoGuard;
use crate::event::{Notifier, ObserverSlot, PartyEvent, NOTICE_CONNECT_FAILED, NOTICE_HOST_LEFT};
use crate::link::{resolve_party_id, share_link};
use crate::registry::{Affiliation, ChannelId, ChannelRef, GuestRegistry, HostLink};
use crate::status::{PartyRole, PartyState, PartyStatus};

/// Transport activity queued for the engine
#[derive(Debug)]
pub enum Inbound {
    /// Peer-level event from the local endpoint
    Endpoint { epoch: u64, event: EndpointEvent },
    /// The endpoint's event stream ended
    EndpointClosed { epoch: u64 },
    /// Outcome of a guest's dial to the host
    Dialed {
        epoch: u64,
        result: Result<Connection, TransportError>,
    },
    /// Activity on one adopted channel
    Channel {
        epoch: u64,
        peer: PeerAddr,
        id: ChannelId,
        signal: ChannelSignal,
    },
}

impl Inbound {
    fn epoch(&self) -> u64 {
        match self {
            Inbound::Endpoint { epoch, .. }
            | Inbound::EndpointClosed { epoch }
            | Inbound::Dialed { epoch, .. }
            | Inbound::Channel { epoch, .. } => *epoch,
        }
    }
}

/// Channel activity, as seen by the engine
pub enum ChannelSignal {
    Opened(Arc<dyn TransportSender>),
    Data(Bytes),
    Closed(Option<String>),
    Failed(String),
}

impl std::fmt::Debug for ChannelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelSignal::Opened(_) => f.write_str("Opened"),
            ChannelSignal::Data(data) => write!(f, "Data({} bytes)", data.len()),
            ChannelSignal::Closed(reason) => write!(f, "Closed({:?})", reason),
            ChannelSignal::Failed(e) => write!(f, "Failed({})", e),
        }
    }
}

/// One watch-party participant
pub struct WatchParty {
    pub(crate) config: PartyConfig,
    network: Arc<dyn PeerNetwork>,
    inbound: mpsc::Sender<Inbound>,
    epoch: u64,
    next_channel: ChannelId,
    tasks: Vec<JoinHandle<()>>,
    /// Every channel owned by the current session, registered or not
    links: HashMap<ChannelId, Arc<dyn TransportSender>>,
    endpoint: Option<Arc<dyn PeerEndpoint>>,
    pub(crate) affiliation: Affiliation,
    status: PartyStatus,
    peer_id: Option<PeerAddr>,
    pub(crate) active: bool,
    pub(crate) clock: Option<Box<dyn PlaybackClock>>,
    pub(crate) casting: bool,
    pub(crate) echo: EchoGuard,
    notifier: Notifier,
}

impl WatchParty {
    /// Create an idle engine. The receiver must be drained into
    /// [`WatchParty::dispatch`].
    pub fn new(config: PartyConfig, network: Arc<dyn PeerNetwork>) -> (Self, mpsc::Receiver<Inbound>) {
        let (inbound, rx) = mpsc::channel(config.event_buffer.max(1));
        let party = Self {
            echo: EchoGuard::new(config.echo_window()),
            notifier: Notifier::new(config.event_buffer),
            config,
            network,
            inbound,
            epoch: 0,
            next_channel: 0,
            tasks: Vec::new(),
            links: HashMap::new(),
            endpoint: None,
            affiliation: Affiliation::Idle,
            status: PartyStatus::Disconnected,
            peer_id: None,
            active: false,
            clock: None,
            casting: false,
        };
        (party, rx)
    }

    pub fn config(&self) -> &PartyConfig {
        &self.config
    }

    pub fn status(&self) -> PartyStatus {
        self.status
    }

    pub fn role(&self) -> PartyRole {
        self.affiliation.role()
    }

    /// Hosting, or a guest with an open host channel
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Local transport address; the party id while hosting
    pub fn peer_id(&self) -> Option<&str> {
        self.peer_id.as_deref()
    }

    pub fn guest_count(&self) -> usize {
        match &self.affiliation {
            Affiliation::Host(guests) => guests.len(),
            _ => 0,
        }
    }

    /// Channels the current session owns, including ones not yet open
    pub fn channel_count(&self) -> usize {
        self.links.len()
    }

    /// Link guests open to join, while hosting
    pub fn share_link(&self) -> Option<String> {
        match (&self.affiliation, &self.peer_id) {
            (Affiliation::Host(_), Some(id)) => match share_link(&self.config.share_base_url, id) {
                Ok(link) => Some(link),
                Err(e) => {
                    warn!("cannot build share link: {}", e);
                    None
                }
            },
            _ => None,
        }
    }

    pub fn state(&self) -> PartyState {
        PartyState {
            peer_id: self.peer_id.clone(),
            role: self.role(),
            status: self.status,
            is_active: self.active,
            guest_count: self.guest_count(),
            share_link: self.share_link(),
            playback: self.clock.as_deref().map(|c| c.snapshot()),
        }
    }

    /// Holder for the event callback
    pub fn observer(&self) -> &ObserverSlot {
        self.notifier.observer()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PartyEvent> {
        self.notifier.subscribe()
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn attach_clock(&mut self, clock: Box<dyn PlaybackClock>) {
        self.clock = Some(clock);
    }

    pub fn detach_clock(&mut self) -> Option<Box<dyn PlaybackClock>> {
        self.clock.take()
    }

    pub fn clock(&self) -> Option<&dyn PlaybackClock> {
        self.clock.as_deref()
    }

    pub fn playback(&self) -> Option<PlaybackSnapshot> {
        self.clock.as_deref().map(|c| c.snapshot())
    }

    /// While casting, remote commands and local controls are ignored
    pub fn set_casting(&mut self, casting: bool) {
        if self.casting != casting {
            info!("casting {}", if casting { "started" } else { "stopped" });
        }
        self.casting = casting;
    }

    pub fn is_casting(&self) -> bool {
        self.casting
    }

    /// Playback speed is locked while casting or in a party
    pub fn can_change_speed(&self) -> bool {
        !self.casting && !self.active
    }

    pub fn is_echo_armed(&self) -> bool {
        self.echo.is_armed()
    }

    /// When the echo guard should be cleared, if it is armed
    pub fn echo_deadline(&self) -> Option<Instant> {
        self.echo.deadline()
    }

    pub fn expire_echo(&mut self) {
        if self.echo.expire() {
            debug!("echo suppression cleared");
        }
    }

    /// Start hosting under `identity`, or a network-chosen one.
    ///
    /// Any current session is left first. On failure the status becomes
    /// [`PartyStatus::Error`] with nothing left open.
    pub async fn start_party(&mut self, identity: Option<&str>) {
        self.teardown().await;
        info!("starting party");

        let endpoint = match self.network.open(identity).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                if e.is_identity_error() {
                    warn!("party id is already taken: {}", e);
                } else {
                    warn!("could not register party identity: {}", e);
                }
                self.fail().await;
                return;
            }
        };

        let id = endpoint.local_addr();
        self.affiliation = Affiliation::Host(GuestRegistry::new());
        self.peer_id = Some(id.clone());
        self.watch_endpoint(endpoint.clone());
        self.endpoint = Some(endpoint);
        self.active = true;
        info!("hosting party {}", id);
        self.set_status(PartyStatus::Hosting);
    }

    /// Join the party behind `target`, a party id or a share link.
    ///
    /// Returns once dialing has started; the outcome arrives as a status
    /// change.
    pub async fn join_party(&mut self, target: &str) {
        self.teardown().await;

        let host = match resolve_party_id(target) {
            Some(host) => host,
            None => {
                warn!("no party id in {:?}", target);
                self.fail().await;
                return;
            }
        };
        info!("joining party {}", host);

        let endpoint = match self.network.open(None).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("could not register guest identity: {}", e);
                self.fail().await;
                return;
            }
        };

        self.peer_id = Some(endpoint.local_addr());
        self.affiliation = Affiliation::Guest(HostLink::new(host.clone()));
        self.watch_endpoint(endpoint.clone());
        self.endpoint = Some(endpoint.clone());
        self.set_status(PartyStatus::Connecting);

        let epoch = self.epoch;
        let inbound = self.inbound.clone();
        self.tasks.push(tokio::spawn(async move {
            let result = endpoint.connect(&host).await;
            let _ = inbound.send(Inbound::Dialed { epoch, result }).await;
        }));
    }

    /// Leave the current session, closing everything it owns
    pub async fn end_party(&mut self) {
        if self.endpoint.is_some() || self.role() != PartyRole::Unaffiliated {
            info!("leaving party");
        }
        self.teardown().await;
        self.set_status(PartyStatus::Disconnected);
    }

    /// Process one queued transport item
    pub async fn dispatch(&mut self, inbound: Inbound) {
        if inbound.epoch() != self.epoch {
            debug!("ignoring event from a finished session");
            // Connections handed to a finished session still need closing
            match inbound {
                Inbound::Dialed {
                    result: Ok(conn), ..
                }
                | Inbound::Endpoint {
                    event: EndpointEvent::Incoming(conn),
                    ..
                } => {
                    let _ = conn.sender.close().await;
                }
                _ => {}
            }
            return;
        }

        match inbound {
            Inbound::Endpoint { event, .. } => self.on_endpoint_event(event).await,
            Inbound::EndpointClosed { .. } => {
                if self.role() != PartyRole::Unaffiliated {
                    error!("peer endpoint closed unexpectedly");
                    self.fail().await;
                }
            }
            Inbound::Dialed { result, .. } => self.on_dialed(result).await,
            Inbound::Channel {
                peer, id, signal, ..
            } => match signal {
                ChannelSignal::Opened(sender) => self.on_channel_open(peer, id, sender).await,
                ChannelSignal::Data(data) => self.on_channel_data(&peer, id, &data).await,
                ChannelSignal::Closed(reason) => self.on_channel_close(&peer, id, reason).await,
                ChannelSignal::Failed(e) => warn!("channel to {} reported: {}", peer, e),
            },
        }
    }

    async fn on_endpoint_event(&mut self, event: EndpointEvent) {
        match event {
            EndpointEvent::Incoming(conn) => match self.affiliation {
                Affiliation::Host(_) => {
                    debug!("incoming channel from {}", conn.peer);
                    self.adopt(conn.peer.clone(), conn);
                }
                _ => {
                    debug!("not hosting, refusing channel from {}", conn.peer);
                    let _ = conn.sender.close().await;
                }
            },
            EndpointEvent::SignalingLost => {
                if self.role() != PartyRole::Unaffiliated {
                    warn!("lost signaling, waiting for the network to reconnect");
                    self.set_status(PartyStatus::Connecting);
                }
            }
            EndpointEvent::SignalingRestored => {
                let status = match &self.affiliation {
                    Affiliation::Idle => return,
                    Affiliation::Host(_) => PartyStatus::Hosting,
                    Affiliation::Guest(link) if link.open_channel().is_some() => PartyStatus::Connected,
                    Affiliation::Guest(_) => PartyStatus::Connecting,
                };
                info!("signaling restored");
                self.set_status(status);
            }
            EndpointEvent::Error(e) => {
                error!("peer endpoint error: {}", e);
                self.fail().await;
            }
        }
    }

    async fn on_dialed(&mut self, result: Result<Connection, TransportError>) {
        let host = match &mut self.affiliation {
            Affiliation::Guest(link) => link.host.clone(),
            _ => {
                if let Ok(conn) = result {
                    let _ = conn.sender.close().await;
                }
                return;
            }
        };

        match result {
            Ok(conn) => {
                debug!("dialed {}, waiting for the channel to open", host);
                let id = self.adopt(host, conn);
                if let Affiliation::Guest(link) = &mut self.affiliation {
                    link.pending = Some(id);
                }
            }
            Err(e) => {
                warn!("could not reach party {}: {}", host, e);
                self.fail().await;
            }
        }
    }

    /// Take ownership of a channel and pump its events into the queue
    fn adopt(&mut self, peer: PeerAddr, conn: Connection) -> ChannelId {
        let id = self.next_channel;
        self.next_channel += 1;
        self.links.insert(id, conn.sender.clone());
        self.tasks.retain(|task| !task.is_finished());

        let epoch = self.epoch;
        let inbound = self.inbound.clone();
        let sender = conn.sender;
        let mut receiver = conn.receiver;
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let signal = match event {
                    TransportEvent::Connected => ChannelSignal::Opened(sender.clone()),
                    TransportEvent::Data(data) => ChannelSignal::Data(data),
                    TransportEvent::Disconnected { reason } => ChannelSignal::Closed(reason),
                    TransportEvent::Error(e) => ChannelSignal::Failed(e),
                };
                let closed = matches!(signal, ChannelSignal::Closed(_));
                let item = Inbound::Channel {
                    epoch,
                    peer: peer.clone(),
                    id,
                    signal,
                };
                if inbound.send(item).await.is_err() || closed {
                    return;
                }
            }
            let _ = inbound
                .send(Inbound::Channel {
                    epoch,
                    peer,
                    id,
                    signal: ChannelSignal::Closed(None),
                })
                .await;
        }));
        id
    }

    fn watch_endpoint(&mut self, endpoint: Arc<dyn PeerEndpoint>) {
        let epoch = self.epoch;
        let inbound = self.inbound.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(event) = endpoint.next_event().await {
                if inbound.send(Inbound::Endpoint { epoch, event }).await.is_err() {
                    return;
                }
            }
            let _ = inbound.send(Inbound::EndpointClosed { epoch }).await;
        }));
    }

    pub(crate) async fn on_channel_open(
        &mut self,
        peer: PeerAddr,
        id: ChannelId,
        sender: Arc<dyn TransportSender>,
    ) {
        self.links.entry(id).or_insert_with(|| sender.clone());

        match &mut self.affiliation {
            Affiliation::Host(guests) => {
                if let Some(old) = guests.get(&peer).cloned() {
                    debug!("{} reconnected, closing its previous channel", peer);
                    self.links.remove(&old.id);
                    let _ = old.sender.close().await;
                }
                guests.insert(peer.clone(), ChannelRef::new(id, sender));
                info!("guest {} joined ({} connected)", peer, guests.len());
                self.notifier.emit(PartyEvent::PeerJoined(peer));
                self.set_status(PartyStatus::Hosting);
            }
            Affiliation::Guest(link) if link.host == peer && link.channel.is_none() => {
                link.pending = None;
                link.channel = Some(ChannelRef::new(id, sender));
                self.active = true;
                info!("connected to party host {}", peer);
                self.set_status(PartyStatus::Connected);
                // Late-join catch-up
                self.send_message(&Message::SyncRequest, None).await;
            }
            _ => {
                debug!("unexpected channel from {}, closing", peer);
                self.links.remove(&id);
                let _ = sender.close().await;
            }
        }
    }

    async fn on_channel_data(&mut self, peer: &str, id: ChannelId, data: &[u8]) {
        if !self.affiliation.owns(peer, id) {
            debug!("dropping data from unregistered channel {}", peer);
            return;
        }
        match decode(data) {
            Ok(message) => self.receive(peer, message).await,
            Err(e) if e.is_unknown_type() => debug!("ignoring message from {}: {}", peer, e),
            Err(e) => debug!("dropping malformed message from {}: {}", peer, e),
        }
    }

    async fn on_channel_close(&mut self, peer: &str, id: ChannelId, reason: Option<String>) {
        self.links.remove(&id);

        match &mut self.affiliation {
            Affiliation::Host(guests) => {
                if guests.remove(peer, id) {
                    info!(
                        "guest {} left ({}), {} connected",
                        peer,
                        reason.as_deref().unwrap_or("closed"),
                        guests.len()
                    );
                    self.notifier.emit(PartyEvent::PeerLeft(peer.to_string()));
                    self.set_status(PartyStatus::Hosting);
                }
            }
            Affiliation::Guest(link) if link.host == peer => {
                if link.channel.as_ref().map(|c| c.id) == Some(id) {
                    warn!(
                        "host channel closed ({})",
                        reason.as_deref().unwrap_or("no reason")
                    );
                    self.teardown().await;
                    self.set_status(PartyStatus::Disconnected);
                    self.notifier
                        .emit(PartyEvent::Notice(NOTICE_HOST_LEFT.to_string()));
                } else if link.pending == Some(id) {
                    warn!("host {} refused the channel", peer);
                    self.fail().await;
                }
            }
            _ => {}
        }
    }

    /// Release everything, then report a failed start or join
    async fn fail(&mut self) {
        self.teardown().await;
        self.set_status(PartyStatus::Error);
        self.notifier
            .emit(PartyEvent::Notice(NOTICE_CONNECT_FAILED.to_string()));
    }

    /// Close every owned channel and the endpoint, then reset to idle.
    ///
    /// Status is left to the caller.
    async fn teardown(&mut self) {
        self.epoch += 1;
        for task in self.tasks.drain(..) {
            task.abort();
        }

        let links: Vec<_> = self.links.drain().collect();
        if !links.is_empty() {
            debug!("closing {} channels", links.len());
        }
        for (_, sender) in links {
            if let Err(e) = sender.close().await {
                debug!("error closing channel: {}", e);
            }
        }

        if let Some(endpoint) = self.endpoint.take() {
            if let Err(e) = endpoint.destroy().await {
                debug!("error destroying endpoint: {}", e);
            }
        }

        self.affiliation = Affiliation::Idle;
        self.peer_id = None;
        self.active = false;
        self.echo.reset();
    }

    fn set_status(&mut self, status: PartyStatus) {
        if self.status == status {
            return;
        }
        info!("status {} -> {}", self.status, status);
        self.status = status;
        self.notifier.emit(PartyEvent::StatusChanged(status));
    }

    /// Become a guest whose host channel is already open
    #[cfg(test)]
    pub(crate) async fn adopt_guest_link(
        &mut self,
        host: PeerAddr,
        id: ChannelId,
        sender: Arc<dyn TransportSender>,
    ) {
        self.affiliation = Affiliation::Guest(HostLink::new(host.clone()));
        self.set_status(PartyStatus::Connecting);
        self.on_channel_open(host, id, sender).await;
    }
}

impl Drop for WatchParty {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
