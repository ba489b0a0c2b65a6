//! Session status and role

use serde::{Deserialize, Serialize};
use std::fmt;
use syncwatch_core::PlaybackSnapshot;

/// Connection status of the local node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    #[default]
    Disconnected,
    /// Registered as host; zero or more guests
    Hosting,
    /// Guest dialing, or any role while signaling is down
    Connecting,
    /// Guest with an open host channel
    Connected,
    /// Last start or join failed; everything was released
    Error,
}

impl PartyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyStatus::Disconnected => "disconnected",
            PartyStatus::Hosting => "hosting",
            PartyStatus::Connecting => "connecting",
            PartyStatus::Connected => "connected",
            PartyStatus::Error => "error",
        }
    }
}

impl fmt::Display for PartyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of the local node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    #[default]
    Unaffiliated,
    Host,
    Guest,
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PartyRole::Unaffiliated => "unaffiliated",
            PartyRole::Host => "host",
            PartyRole::Guest => "guest",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyState {
    /// Local transport address; for a host this is the party id
    pub peer_id: Option<String>,
    pub role: PartyRole,
    pub status: PartyStatus,
    /// Hosting, or joined with an open host channel
    pub is_active: bool,
    /// Registered guest channels (hosts only)
    pub guest_count: usize,
    /// Link guests can open to join (hosts only)
    pub share_link: Option<String>,
    /// Attached clock, if any
    pub playback: Option<PlaybackSnapshot>,
}
