//! Common test helpers for SyncWatch tests
//!
//! - Condition-based waiting (no hardcoded sleeps)
//! - A manually driven playback clock with call counters
//! - Collectors for party events
//! - A bare protocol peer for observing exactly what a host sends

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use syncwatch_core::{decode, encode, Message, PlaybackSnapshot};
use syncwatch_party::{PartyEvent, PartyStatus, PlaybackClock};
use syncwatch_transport::{PeerEndpoint, PeerNetwork, TransportEvent, TransportSender};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    check().await
}

/// Wait for a synchronous predicate
pub async fn wait_until<F>(check: F, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    let check = &check;
    wait_for(move || async move { check() }, DEFAULT_CHECK_INTERVAL, max_wait).await
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_until(|| counter.load(Ordering::SeqCst) >= target, max_wait).await
}

/// Compare floats with a tolerance
pub fn assert_approx_eq(actual: f64, expected: f64, epsilon: f64, msg: &str) -> Result<(), String> {
    if (actual - expected).abs() <= epsilon {
        Ok(())
    } else {
        Err(format!(
            "{}: expected {} +/- {}, got {}",
            msg, expected, epsilon, actual
        ))
    }
}

// ============================================================================
// Manual Clock
// ============================================================================

#[derive(Debug, Default)]
struct ClockState {
    time: f64,
    playing: bool,
    duration: Option<f64>,
    set_time_calls: u32,
    play_calls: u32,
    pause_calls: u32,
}

/// A clock that only moves when told to.
///
/// Clones share state: hand one to the engine, keep one to inspect.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ClockState>>,
}

impl ManualClock {
    pub fn new(time: f64, playing: bool) -> Self {
        let clock = Self::default();
        {
            let mut state = clock.state.lock();
            state.time = time;
            state.playing = playing;
            state.duration = Some(3600.0);
        }
        clock
    }

    pub fn with_duration(self, duration: Option<f64>) -> Self {
        self.state.lock().duration = duration;
        self
    }

    /// Boxed clone for handing to the engine
    pub fn boxed(&self) -> Box<dyn PlaybackClock> {
        Box::new(self.clone())
    }

    pub fn time(&self) -> f64 {
        self.state.lock().time
    }

    pub fn playing(&self) -> bool {
        self.state.lock().playing
    }

    /// Move the position without counting it as a command
    pub fn advance(&self, secs: f64) {
        self.state.lock().time += secs;
    }

    pub fn set_time_calls(&self) -> u32 {
        self.state.lock().set_time_calls
    }

    pub fn play_calls(&self) -> u32 {
        self.state.lock().play_calls
    }

    pub fn pause_calls(&self) -> u32 {
        self.state.lock().pause_calls
    }

    /// Number of commands of any kind
    pub fn command_count(&self) -> u32 {
        let state = self.state.lock();
        state.set_time_calls + state.play_calls + state.pause_calls
    }
}

impl PlaybackClock for ManualClock {
    fn current_time(&self) -> f64 {
        self.time()
    }

    fn is_playing(&self) -> bool {
        self.playing()
    }

    fn duration(&self) -> Option<f64> {
        self.state.lock().duration
    }

    fn set_time(&mut self, time: f64) {
        let mut state = self.state.lock();
        state.set_time_calls += 1;
        state.time = time;
    }

    fn play(&mut self) {
        let mut state = self.state.lock();
        state.play_calls += 1;
        state.playing = true;
    }

    fn pause(&mut self) {
        let mut state = self.state.lock();
        state.pause_calls += 1;
        state.playing = false;
    }
}

// ============================================================================
// Event Collection
// ============================================================================

/// Collector for party events with thread-safe access
#[derive(Clone, Default)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<PartyEvent>>>,
    notify: Arc<Notify>,
    count: Arc<AtomicU32>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback to install with `on_event`
    pub fn callback(&self) -> impl Fn(&PartyEvent) + Send + Sync + 'static {
        let events = self.events.clone();
        let notify = self.notify.clone();
        let count = self.count.clone();

        move |event| {
            events.lock().push(event.clone());
            count.fetch_add(1, Ordering::SeqCst);
            notify.notify_waiters();
        }
    }

    pub fn events(&self) -> Vec<PartyEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Every status reported so far, in order
    pub fn statuses(&self) -> Vec<PartyStatus> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                PartyEvent::StatusChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                PartyEvent::Notice(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_status(&self) -> Option<PartyStatus> {
        self.statuses().last().copied()
    }

    pub async fn wait_for_status(&self, status: PartyStatus, max_wait: Duration) -> bool {
        wait_until(|| self.statuses().contains(&status), max_wait).await
    }

    pub async fn wait_for_notice(&self, max_wait: Duration) -> bool {
        wait_until(|| !self.notices().is_empty(), max_wait).await
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        self.count.store(0, Ordering::SeqCst);
    }
}

// ============================================================================
// Raw Protocol Peer
// ============================================================================

/// A bare guest: dials a host and records every message it receives,
/// without running an engine of its own.
pub struct RawPeer {
    endpoint: Arc<dyn PeerEndpoint>,
    sender: Arc<dyn TransportSender>,
    received: Arc<Mutex<Vec<Message>>>,
    open: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl RawPeer {
    /// Register `identity` on `network` and dial `host`
    pub async fn connect(
        network: &dyn PeerNetwork,
        identity: &str,
        host: &str,
    ) -> syncwatch_transport::Result<Self> {
        let endpoint = network.open(Some(identity)).await?;
        let conn = endpoint.connect(host).await?;

        let received = Arc::new(Mutex::new(Vec::new()));
        let open = Arc::new(AtomicBool::new(false));
        let mut receiver = conn.receiver;
        let sink = received.clone();
        let flag = open.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match event {
                    TransportEvent::Connected => flag.store(true, Ordering::SeqCst),
                    TransportEvent::Data(data) => {
                        if let Ok(msg) = decode(&data) {
                            sink.lock().push(msg);
                        }
                    }
                    TransportEvent::Disconnected { .. } => break,
                    TransportEvent::Error(_) => {}
                }
            }
            flag.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            endpoint,
            sender: conn.sender,
            received,
            open,
            task,
        })
    }

    pub fn addr(&self) -> String {
        self.endpoint.local_addr()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub async fn send(&self, message: &Message) -> syncwatch_transport::Result<()> {
        let payload = encode(message)
            .map_err(|e| syncwatch_transport::TransportError::SendFailed(e.to_string()))?;
        self.sender.send(payload).await
    }

    /// Send raw bytes, for malformed-input tests
    pub async fn send_raw(&self, payload: &'static [u8]) -> syncwatch_transport::Result<()> {
        self.sender.send(payload.into()).await
    }

    pub fn messages(&self) -> Vec<Message> {
        self.received.lock().clone()
    }

    /// Sync responses received so far
    pub fn snapshots(&self) -> Vec<PlaybackSnapshot> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                Message::SyncResponse { time, is_playing } => Some(PlaybackSnapshot::new(time, is_playing)),
                _ => None,
            })
            .collect()
    }

    pub async fn wait_for_messages(&self, n: usize, max_wait: Duration) -> bool {
        wait_until(|| self.received.lock().len() >= n, max_wait).await
    }

    pub async fn wait_closed(&self, max_wait: Duration) -> bool {
        wait_until(|| self.task.is_finished(), max_wait).await
    }

    /// Close the channel and release the identity
    pub async fn leave(&self) {
        let _ = self.sender.close().await;
        let _ = self.endpoint.destroy().await;
    }
}

impl Drop for RawPeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
