//! SyncWatch Party
//!
//! Session engine that keeps several players in lock-step: one host is the
//! authority, guests follow it.
//!
//! - Role and status tracking ([`PartyStatus`], [`PartyRole`])
//! - Connection registry ([`registry`])
//! - Role-aware routing of playback messages ([`router`])
//! - Applying remote commands to a [`PlaybackClock`] ([`applier`])
//! - Turning local controls into messages ([`emitter`])
//! - Late-join catch-up and echo suppression
//!
//! Most embedders want [`PartyRuntime::spawn`] and the [`PartyHandle`] it
//! returns. [`WatchParty`] is the synchronous core it drives.

pub mod applier;
pub mod clock;
pub mod config;
pub mod echo;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod event;
pub mod link;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use applier::{apply, Applied};
pub use clock::{PlaybackClock, SimulatedClock};
pub use config::PartyConfig;
pub use echo::EchoGuard;
pub use engine::{ChannelSignal, Inbound, WatchParty};
pub use error::{PartyError, Result};
pub use event::{
    ObserverSlot, PartyEvent, PartyEventCallback, NOTICE_CONNECT_FAILED, NOTICE_HOST_LEFT,
};
pub use link::{resolve_party_id, share_link};
pub use registry::{Affiliation, ChannelId, ChannelRef, GuestRegistry, HostLink};
pub use runtime::{PartyHandle, PartyRuntime};
pub use status::{PartyRole, PartyState, PartyStatus};
