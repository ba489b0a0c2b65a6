//! Message routing
//!
//! Routing depends only on the local role:
//!
//! | Role | Send | Receive |
//! |------|------|---------|
//! | host | one guest, or every open guest channel | answer `SYNC_REQUEST` to its sender; rebroadcast anything else, then apply |
//! | guest | the host channel | apply |
//! | unaffiliated | nothing | nothing |

use futures::future::join_all;
use std::sync::Arc;
use syncwatch_core::{encode, Message};
use syncwatch_transport::{PeerAddr, TransportSender};
use tracing::{debug, trace, warn};

use crate::engine::WatchParty;
use crate::registry::Affiliation;

impl WatchParty {
    /// Send a message according to the local role.
    ///
    /// Hosts send to `target` if given, otherwise to every open guest
    /// channel; guests always send to the host. Channels that are not open
    /// are skipped and a failed send never affects the others. Returns the
    /// number of channels the message was delivered to.
    pub async fn send_message(&self, message: &Message, target: Option<&str>) -> usize {
        let targets: Vec<(PeerAddr, Arc<dyn TransportSender>)> = match &self.affiliation {
            Affiliation::Idle => {
                trace!("not in a party, not sending {}", message.kind());
                return 0;
            }
            Affiliation::Host(guests) => match target {
                Some(peer) => guests
                    .get(peer)
                    .filter(|c| c.is_open())
                    .map(|c| (peer.to_string(), c.sender.clone()))
                    .into_iter()
                    .collect(),
                None => guests
                    .iter()
                    .filter(|(_, c)| c.is_open())
                    .map(|(peer, c)| (peer.clone(), c.sender.clone()))
                    .collect(),
            },
            Affiliation::Guest(link) => link
                .open_channel()
                .map(|c| (link.host.clone(), c.sender.clone()))
                .into_iter()
                .collect(),
        };

        if targets.is_empty() {
            debug!("no open channel for {}", message.kind());
            return 0;
        }

        let payload = match encode(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("not sending {}: {}", message.kind(), e);
                return 0;
            }
        };

        let sends = targets.iter().map(|(peer, sender)| {
            let payload = payload.clone();
            async move {
                match sender.send(payload).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("failed to send {} to {}: {}", message.kind(), peer, e);
                        false
                    }
                }
            }
        });
        let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();
        trace!("sent {} to {}/{} peers", message.kind(), delivered, targets.len());
        delivered
    }

    /// Handle a message delivered by the channel of `from`
    pub(crate) async fn receive(&mut self, from: &str, message: Message) {
        debug!("received {} from {}", message.kind(), from);

        if let Affiliation::Host(_) = self.affiliation {
            if let Message::SyncRequest = message {
                let snapshot = match self.clock.as_deref() {
                    Some(clock) => clock.snapshot(),
                    None => {
                        debug!("no clock attached, dropping sync request from {}", from);
                        return;
                    }
                };
                debug!(
                    "answering sync request from {} with {:.2}s (playing: {})",
                    from, snapshot.time, snapshot.is_playing
                );
                self.send_message(&snapshot.into_response(), Some(from)).await;
                return;
            }

            // Rebroadcast includes the origin
            self.send_message(&message, None).await;
        }

        self.apply_remote(&message);
    }
}
