//! Fakes shared by the unit tests in this crate

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use syncwatch_core::{decode, Message};
use syncwatch_transport::{MemoryNetwork, TransportError, TransportSender};

use crate::clock::PlaybackClock;
use crate::config::PartyConfig;
use crate::engine::WatchParty;

/// Clock with plain fields and call counters
#[derive(Debug, Default)]
pub(crate) struct FakeClock {
    pub time: f64,
    pub playing: bool,
    pub duration: Option<f64>,
    pub play_calls: usize,
    pub pause_calls: usize,
    pub seek_calls: usize,
}

impl FakeClock {
    pub fn paused_at(time: f64) -> Self {
        Self {
            time,
            duration: Some(600.0),
            ..Default::default()
        }
    }

    pub fn playing_at(time: f64) -> Self {
        Self {
            playing: true,
            ..Self::paused_at(time)
        }
    }
}

impl PlaybackClock for FakeClock {
    fn current_time(&self) -> f64 {
        self.time
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn set_time(&mut self, time: f64) {
        self.seek_calls += 1;
        self.time = time;
    }

    fn play(&mut self) {
        self.play_calls += 1;
        self.playing = true;
    }

    fn pause(&mut self) {
        self.pause_calls += 1;
        self.playing = false;
    }
}

/// Sender that decodes and keeps everything it is given
#[derive(Default)]
pub(crate) struct FakeSender {
    sent: Mutex<Vec<Message>>,
    closed: AtomicBool,
    failing: bool,
}

impl FakeSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            failing: true,
            ..Default::default()
        })
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportSender for FakeSender {
    async fn send(&self, data: Bytes) -> syncwatch_transport::Result<()> {
        if self.failing {
            return Err(TransportError::SendFailed("fake failure".into()));
        }
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        if let Ok(msg) = decode(&data) {
            self.sent.lock().push(msg);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.is_closed()
    }

    async fn close(&self) -> syncwatch_transport::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// An idle engine on a fresh in-memory network
pub(crate) fn party() -> WatchParty {
    let (party, _inbound) = WatchParty::new(PartyConfig::default(), Arc::new(MemoryNetwork::new()));
    party
}

/// A host on a fresh in-memory network with fake guest channels registered
pub(crate) async fn host_with_guests(
    clock: Option<FakeClock>,
    guests: &[(&str, Arc<FakeSender>)],
) -> WatchParty {
    let mut party = party();
    if let Some(clock) = clock {
        party.attach_clock(Box::new(clock));
    }
    party.start_party(Some("H")).await;
    for (i, (addr, sender)) in guests.iter().enumerate() {
        party
            .on_channel_open(addr.to_string(), 1000 + i as u64, sender.clone())
            .await;
    }
    party
}

/// A guest whose host channel is the given fake sender
pub(crate) async fn guest_of(clock: Option<FakeClock>, host: Arc<FakeSender>) -> WatchParty {
    let mut party = party();
    if let Some(clock) = clock {
        party.attach_clock(Box::new(clock));
    }
    party.adopt_guest_link("H".to_string(), 1, host).await;
    party
}
