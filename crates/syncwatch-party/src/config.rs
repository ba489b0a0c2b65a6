//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use syncwatch_core::{ECHO_SUPPRESSION_MS, SEEK_TOLERANCE_SECS};

/// Party engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyConfig {
    /// How long a remotely applied command blocks local re-emission (ms)
    pub echo_window_ms: u64,
    /// Remote seeks within this distance of the local position are ignored
    pub seek_tolerance_secs: f64,
    /// Page that share links point at; the party id goes in its query
    pub share_base_url: String,
    /// Capacity of the engine's command and event queues
    pub event_buffer: usize,
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            echo_window_ms: ECHO_SUPPRESSION_MS,
            seek_tolerance_secs: SEEK_TOLERANCE_SECS,
            share_base_url: "http://localhost:5173/".to_string(),
            event_buffer: 256,
        }
    }
}

impl PartyConfig {
    pub fn echo_window(&self) -> Duration {
        Duration::from_millis(self.echo_window_ms)
    }
}
