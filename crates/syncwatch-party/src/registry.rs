//! Connection registry
//!
//! The local node's role and the channels it owns live together in
//! [`Affiliation`]: a host keeps one channel per guest address, a guest keeps
//! at most one channel to its host, an idle node keeps none.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use syncwatch_transport::{PeerAddr, TransportSender};

use crate::status::PartyRole;

/// Engine-assigned identifier for one adopted channel
pub type ChannelId = u64;

/// An open channel as tracked by the registry
#[derive(Clone)]
pub struct ChannelRef {
    pub id: ChannelId,
    pub sender: Arc<dyn TransportSender>,
}

impl ChannelRef {
    pub fn new(id: ChannelId, sender: Arc<dyn TransportSender>) -> Self {
        Self { id, sender }
    }

    pub fn is_open(&self) -> bool {
        self.sender.is_connected()
    }
}

impl fmt::Debug for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRef")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Host-side map of guest address to channel
#[derive(Debug, Default)]
pub struct GuestRegistry {
    guests: HashMap<PeerAddr, ChannelRef>,
}

impl GuestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a guest channel, returning the entry it displaces
    pub fn insert(&mut self, peer: PeerAddr, channel: ChannelRef) -> Option<ChannelRef> {
        self.guests.insert(peer, channel)
    }

    /// Remove a guest, but only while `id` is still its registered channel.
    ///
    /// A reconnecting guest replaces its old entry; the old channel's late
    /// close event must not evict the new one.
    pub fn remove(&mut self, peer: &str, id: ChannelId) -> bool {
        if self.contains(peer, id) {
            self.guests.remove(peer);
            true
        } else {
            false
        }
    }

    pub fn get(&self, peer: &str) -> Option<&ChannelRef> {
        self.guests.get(peer)
    }

    pub fn contains(&self, peer: &str, id: ChannelId) -> bool {
        self.guests.get(peer).map(|c| c.id == id).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerAddr, &ChannelRef)> {
        self.guests.iter()
    }

    pub fn len(&self) -> usize {
        self.guests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guests.is_empty()
    }
}

/// Guest-side link to the host
#[derive(Debug)]
pub struct HostLink {
    /// Address the guest dialed
    pub host: PeerAddr,
    /// Dialed channel that has not opened yet
    pub pending: Option<ChannelId>,
    /// Set once the host channel opens
    pub channel: Option<ChannelRef>,
}

impl HostLink {
    pub fn new(host: PeerAddr) -> Self {
        Self {
            host,
            pending: None,
            channel: None,
        }
    }

    pub fn open_channel(&self) -> Option<&ChannelRef> {
        self.channel.as_ref().filter(|c| c.is_open())
    }
}

/// Role of the local node together with the channels that role owns
#[derive(Debug, Default)]
pub enum Affiliation {
    #[default]
    Idle,
    Host(GuestRegistry),
    Guest(HostLink),
}

impl Affiliation {
    pub fn role(&self) -> PartyRole {
        match self {
            Affiliation::Idle => PartyRole::Unaffiliated,
            Affiliation::Host(_) => PartyRole::Host,
            Affiliation::Guest(_) => PartyRole::Guest,
        }
    }

    /// Number of registered channels
    pub fn channel_count(&self) -> usize {
        match self {
            Affiliation::Idle => 0,
            Affiliation::Host(guests) => guests.len(),
            Affiliation::Guest(link) => usize::from(link.channel.is_some()),
        }
    }

    /// Whether `id` is the registered channel for `peer`
    pub fn owns(&self, peer: &str, id: ChannelId) -> bool {
        match self {
            Affiliation::Idle => false,
            Affiliation::Host(guests) => guests.contains(peer, id),
            Affiliation::Guest(link) => {
                link.host == peer && link.channel.as_ref().map(|c| c.id) == Some(id)
            }
        }
    }
}
