//! Events surfaced to the embedding application

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use syncwatch_transport::PeerAddr;
use tokio::sync::broadcast;
use tracing::trace;

use crate::status::PartyStatus;

/// Shown when hosting or joining fails
pub const NOTICE_CONNECT_FAILED: &str =
    "Could not connect to the party. The ID might be invalid or the host has disconnected.";

/// Shown to a guest whose host channel closed
pub const NOTICE_HOST_LEFT: &str = "Disconnected from the party host.";

/// Something the user or the embedding application should know about
#[derive(Debug, Clone, PartialEq)]
pub enum PartyEvent {
    /// The session status changed
    StatusChanged(PartyStatus),
    /// A message meant for the user
    Notice(String),
    /// A guest channel opened (hosts only)
    PeerJoined(PeerAddr),
    /// A guest channel closed (hosts only)
    PeerLeft(PeerAddr),
}

/// Callback type for party events
pub type PartyEventCallback = Arc<dyn Fn(&PartyEvent) + Send + Sync>;

/// Replaceable holder for the party event callback.
///
/// The current callback is looked up on every event, so replacing it takes
/// effect for the very next event and never needs the engine rebuilt.
#[derive(Clone, Default)]
pub struct ObserverSlot {
    callback: Arc<RwLock<Option<PartyEventCallback>>>,
}

impl ObserverSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a callback, replacing any previous one
    pub fn set<F>(&self, callback: F)
    where
        F: Fn(&PartyEvent) + Send + Sync + 'static,
    {
        *self.callback.write() = Some(Arc::new(callback));
    }

    pub fn clear(&self) {
        *self.callback.write() = None;
    }

    pub fn is_set(&self) -> bool {
        self.callback.read().is_some()
    }

    /// Invoke the current callback, if any
    pub fn notify(&self, event: &PartyEvent) {
        // Cloned out so the callback may replace itself
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }
}

impl fmt::Debug for ObserverSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSlot")
            .field("set", &self.is_set())
            .finish()
    }
}

/// Fans events out to the observer slot and to broadcast subscribers
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    observer: ObserverSlot,
    events: broadcast::Sender<PartyEvent>,
}

impl Notifier {
    pub(crate) fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            observer: ObserverSlot::new(),
            events,
        }
    }

    pub(crate) fn observer(&self) -> &ObserverSlot {
        &self.observer
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<PartyEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: PartyEvent) {
        trace!("party event: {:?}", event);
        self.observer.notify(&event);
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_replaced_callback_gets_next_event() {
        let slot = ObserverSlot::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let sink = first.clone();
        slot.set(move |e| sink.lock().push(e.clone()));
        slot.notify(&PartyEvent::StatusChanged(PartyStatus::Hosting));

        let sink = second.clone();
        slot.set(move |e| sink.lock().push(e.clone()));
        slot.notify(&PartyEvent::Notice("hi".into()));

        assert_eq!(first.lock().len(), 1);
        assert_eq!(second.lock().as_slice(), &[PartyEvent::Notice("hi".into())]);
    }

    #[test]
    fn test_callback_may_replace_itself() {
        let slot = ObserverSlot::new();
        let inner = slot.clone();
        slot.set(move |_| inner.clear());

        slot.notify(&PartyEvent::StatusChanged(PartyStatus::Connecting));
        assert!(!slot.is_set());
    }

    #[tokio::test]
    async fn test_notifier_reaches_subscribers() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.emit(PartyEvent::PeerJoined("A".into()));
        assert_eq!(rx.recv().await.ok(), Some(PartyEvent::PeerJoined("A".into())));
    }
}
